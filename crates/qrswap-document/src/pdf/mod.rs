// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — reading, rasterizing, creating, and editing documents.

pub mod editor;
pub mod rasterizer;
pub mod reader;
pub mod writer;

pub use editor::{Occlusion, PdfEditor};
pub use rasterizer::{
    LopdfRasterizer, PageRaster, PageRasterizer, PdfiumRasterizer, default_rasterizer,
};
pub use reader::PdfReader;
pub use writer::PdfWriter;
