// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Handle table for binary outputs handed to the front end.
//
// Every preview PNG and modified artifact lives here until it is released.
// Handles are never reclaimed implicitly: the session releases superseded
// handles itself and releases everything on reset.

use std::collections::HashMap;
use std::sync::Arc;

use qrswap_core::types::MediaKind;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Opaque handle to a stored binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle(pub Uuid);

impl ResourceHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a stored binary is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// PNG rendering of the current page.
    Preview,
    /// Modified artifact in the source's media kind.
    Artifact,
}

/// A stored binary. Cloning shares the bytes.
#[derive(Debug, Clone)]
pub struct Resource {
    pub kind: ResourceKind,
    pub media: MediaKind,
    pub bytes: Arc<[u8]>,
}

/// Live resources keyed by handle.
#[derive(Debug, Default)]
pub struct ResourceTable {
    live: HashMap<ResourceHandle, Resource>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a binary and issue a fresh handle for it.
    pub fn insert(&mut self, kind: ResourceKind, media: MediaKind, bytes: Arc<[u8]>) -> ResourceHandle {
        let handle = ResourceHandle::new();
        debug!(%handle, ?kind, size = bytes.len(), "Resource issued");
        self.live.insert(handle, Resource { kind, media, bytes });
        handle
    }

    pub fn get(&self, handle: &ResourceHandle) -> Option<&Resource> {
        self.live.get(handle)
    }

    /// Release one handle. Returns `false` if it was not live.
    pub fn release(&mut self, handle: &ResourceHandle) -> bool {
        let released = self.live.remove(handle).is_some();
        if released {
            debug!(%handle, "Resource released");
        }
        released
    }

    /// Release every live handle, returning how many there were.
    pub fn release_all(&mut self) -> usize {
        let count = self.live.len();
        self.live.clear();
        count
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
