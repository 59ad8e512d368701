// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Edit registry — which detections were given new text during the session.
//
// Decoded detections are never rewritten. An edit is recorded beside them,
// keyed by detection id, together with the payload it replaced.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qrswap_core::types::DetectionId;
use serde::{Deserialize, Serialize};

/// One user edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRecord {
    pub id: DetectionId,
    /// Payload the decoder reported for this detection.
    pub original: String,
    /// Text the code was replaced with.
    pub text: String,
    pub edited_at: DateTime<Utc>,
}

/// Append/overwrite map from detection id to replacement text.
#[derive(Debug, Clone, Default)]
pub struct EditRegistry {
    records: BTreeMap<DetectionId, EditRecord>,
}

impl EditRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the edit for `id`.
    ///
    /// Re-editing keeps the first recorded original payload.
    pub fn record(&mut self, id: DetectionId, original: &str, text: &str) {
        let edited_at = Utc::now();
        self.records
            .entry(id)
            .and_modify(|rec| {
                rec.text = text.to_string();
                rec.edited_at = edited_at;
            })
            .or_insert_with(|| EditRecord {
                id,
                original: original.to_string(),
                text: text.to_string(),
                edited_at,
            });
    }

    pub fn get(&self, id: &DetectionId) -> Option<&EditRecord> {
        self.records.get(id)
    }

    pub fn is_edited(&self, id: &DetectionId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records in detection-id order.
    pub fn iter(&self) -> impl Iterator<Item = &EditRecord> {
        self.records.values()
    }
}
