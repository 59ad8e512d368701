// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR adapters — decoding existing codes and generating replacements.

pub mod decoder;
pub mod encoder;

pub use decoder::{DetectorOutput, QrDecoder, QrDetector, RawDetection, RqrrDetector};
pub use encoder::{CapacityHint, QrEncoder};
