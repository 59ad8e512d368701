// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages.
//
// Every technical error is mapped to plain English with a clear suggestion.
// Nothing is retried automatically; the severity only tells the front end how
// to present the message and what the user has to do next.

use crate::error::QrSwapError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Trying the same thing again later is likely to work.
    Transient,
    /// User must change something (pick another page, shorten the text).
    ActionRequired,
    /// The input itself cannot be processed.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            severity,
        }
    }
}

/// Convert a `QrSwapError` into a `HumanError` for display.
pub fn humanize_error(err: &QrSwapError) -> HumanError {
    match err {
        QrSwapError::UnsupportedType(kind) => HumanError::new(
            "This type of file isn't supported.",
            format!("Use a PDF, PNG, or JPEG file. (File type: {kind})"),
            Severity::Permanent,
        ),

        QrSwapError::Decode(_) => HumanError::new(
            "We couldn't read this file.",
            "The file may be damaged or only partly downloaded. Try exporting it again.",
            Severity::Permanent,
        ),

        QrSwapError::PageRange { page_count, .. } => HumanError::new(
            "That page doesn't exist.",
            format!("Choose a page between 1 and {page_count}."),
            Severity::ActionRequired,
        ),

        QrSwapError::Geometry(_) => HumanError::new(
            "The selected QR code has an unusable outline.",
            "Pick a different code, or try a sharper copy of the document.",
            Severity::Permanent,
        ),

        QrSwapError::Encoding(_) => HumanError::new(
            "That text is too long for a QR code.",
            "Shorten the text or link and try again.",
            Severity::ActionRequired,
        ),

        QrSwapError::Canvas(_) => HumanError::new(
            "The image couldn't be redrawn.",
            "Try again with a different file.",
            Severity::Permanent,
        ),

        QrSwapError::Serialization(_) => HumanError::new(
            "The edited document couldn't be saved.",
            "Try the edit again. If it keeps failing, the document may use features we can't rewrite.",
            Severity::Transient,
        ),

        QrSwapError::Render(detail) => HumanError::new(
            "The page couldn't be displayed.",
            format!("Try another page or re-export the document. ({detail})"),
            Severity::Transient,
        ),

        QrSwapError::Busy => HumanError::new(
            "Still working on the previous step.",
            "Wait for it to finish, then try again.",
            Severity::Transient,
        ),

        QrSwapError::Superseded => HumanError::new(
            "That result is out of date.",
            "The document was reset or changed while it was being processed.",
            Severity::Transient,
        ),

        QrSwapError::NotLoaded => HumanError::new(
            "No file is open.",
            "Choose a PDF or image first.",
            Severity::ActionRequired,
        ),

        QrSwapError::UnknownDetection(_) => HumanError::new(
            "That QR code is no longer on screen.",
            "Select a code from the current page and try again.",
            Severity::ActionRequired,
        ),

        QrSwapError::InvalidDetectionId(_) => HumanError::new(
            "That isn't a valid QR code id.",
            "Use an id listed by a scan, such as qr-1-0.",
            Severity::ActionRequired,
        ),

        QrSwapError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError::new(
                    "The file couldn't be found.",
                    "It may have been moved or deleted. Try choosing the file again.",
                    Severity::ActionRequired,
                )
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError::new(
                    "The app doesn't have permission to use that file.",
                    "Check the file permissions, or copy the file somewhere else first.",
                    Severity::ActionRequired,
                )
            } else {
                HumanError::new(
                    "There was a problem reading or writing a file.",
                    "Try again. If this keeps happening, your storage may be full.",
                    Severity::Transient,
                )
            }
        }

        QrSwapError::Json(_) => HumanError::new(
            "The app had an internal data problem.",
            "Try again. If this keeps happening, please report it.",
            Severity::Transient,
        ),
    }
}
