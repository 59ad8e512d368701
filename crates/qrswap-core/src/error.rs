// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for qrswap.

use thiserror::Error;

use crate::types::DetectionId;

/// Top-level error type for all qrswap operations.
#[derive(Debug, Error)]
pub enum QrSwapError {
    // -- Input errors --
    #[error("unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("could not decode input: {0}")]
    Decode(String),

    #[error("page {page} out of range (document has {page_count} pages)")]
    PageRange { page: u32, page_count: u32 },

    // -- Pipeline errors --
    #[error("degenerate QR code geometry: {0}")]
    Geometry(String),

    #[error("QR encoding failed: {0}")]
    Encoding(String),

    #[error("drawing surface unavailable: {0}")]
    Canvas(String),

    #[error("failed to save document: {0}")]
    Serialization(String),

    #[error("page rendering failed: {0}")]
    Render(String),

    // -- Session errors --
    #[error("another operation is already in progress")]
    Busy,

    #[error("operation was superseded by a newer session state")]
    Superseded,

    #[error("no document is loaded")]
    NotLoaded,

    #[error("unknown detection {0}")]
    UnknownDetection(DetectionId),

    #[error("malformed detection id {0:?}")]
    InvalidDetectionId(String),

    // -- Plumbing --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QrSwapError>;
