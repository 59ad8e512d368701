// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrswap-document — QR detection, generation, and geometric replacement.
//
// Provides the coordinate transform between rendered-raster and page space,
// QR decode/encode adapters, a raster compositor, PDF page rendering and
// editing, and the stateless scan/replace pipeline tying them together.

pub mod geometry;
pub mod pdf;
pub mod pipeline;
pub mod qr;
pub mod raster;

// Re-export the primary structs so callers can use `qrswap_document::QrPipeline` etc.
pub use geometry::{PageBox, TargetSpace, to_target};
pub use pdf::{
    LopdfRasterizer, Occlusion, PageRaster, PageRasterizer, PdfEditor, PdfReader, PdfWriter,
    PdfiumRasterizer, default_rasterizer,
};
pub use pipeline::{QrPipeline, RenderedPage, ReplaceOutcome, ScanOutcome};
pub use qr::{DetectorOutput, QrDecoder, QrDetector, QrEncoder, RawDetection, RqrrDetector};
pub use raster::RasterCompositor;
