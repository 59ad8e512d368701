// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source and modified artifacts, fingerprinted with SHA-256.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::{DetectionId, MediaKind};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Compute the SHA-256 hash of `data` as a lowercase hex string.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The file the user loaded. Never modified once created.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    pub name: String,
    pub kind: MediaKind,
    pub bytes: Arc<[u8]>,
    /// SHA-256 of `bytes`, hex encoded.
    pub digest: String,
}

impl SourceArtifact {
    /// Wrap an in-memory upload with its declared MIME type.
    ///
    /// The type is checked before anything else looks at the bytes.
    pub fn from_bytes(name: impl Into<String>, declared_mime: &str, bytes: Vec<u8>) -> Result<Self> {
        let kind = MediaKind::from_mime(declared_mime)?;
        Ok(Self::new(name.into(), kind, bytes))
    }

    /// Read a file from disk, taking the media kind from its extension.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let kind = MediaKind::from_extension(ext).ok_or_else(|| {
            QrSwapError::UnsupportedType(if ext.is_empty() {
                "file without extension".into()
            } else {
                format!(".{ext}")
            })
        })?;
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, kind, bytes))
    }

    fn new(name: String, kind: MediaKind, bytes: Vec<u8>) -> Self {
        let digest = fingerprint(&bytes);
        debug!(%name, %kind, size = bytes.len(), %digest, "Source artifact created");
        Self {
            name,
            kind,
            bytes: bytes.into(),
            digest,
        }
    }
}

/// Output of the most recent successful replace.
#[derive(Debug, Clone)]
pub struct ModifiedArtifact {
    pub kind: MediaKind,
    pub bytes: Arc<[u8]>,
    pub digest: String,
    /// The detection whose replacement produced this artifact.
    pub edited: DetectionId,
    pub produced_at: DateTime<Utc>,
}

impl ModifiedArtifact {
    pub fn new(kind: MediaKind, bytes: Vec<u8>, edited: DetectionId) -> Self {
        Self {
            kind,
            digest: fingerprint(&bytes),
            bytes: bytes.into(),
            edited,
            produced_at: Utc::now(),
        }
    }

    /// Whether the bytes differ from `source`.
    pub fn differs_from(&self, source: &SourceArtifact) -> bool {
        self.digest != source.digest
    }
}
