// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster handling — codec, fills, and the compositor.

pub mod codec;
pub mod compositor;
pub mod fill;

pub use codec::{decode_raster, encode_raster};
pub use compositor::RasterCompositor;
