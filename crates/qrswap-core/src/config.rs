// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. In-memory only; nothing is read from disk or the
// environment.

use serde::{Deserialize, Serialize};

/// How the old code is painted out before the new one is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcclusionPolicy {
    /// Fill the exact detected quadrilateral, following any in-plane rotation.
    #[default]
    Quadrilateral,
    /// Fill the axis-aligned bounding box of the quadrilateral.
    BoundingBox,
}

/// Settings shared by every stage of the scan/replace pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scale applied when rasterizing PDF pages. Decoding happens in the
    /// rendered raster's pixel space, so the same factor is used to map
    /// detections back to page points.
    pub render_scale: f64,
    /// Pixel size of one module in generated QR rasters.
    pub module_px: u32,
    /// Quiet-zone width around generated codes, in modules.
    pub margin_modules: u32,
    /// Quality used when re-encoding JPEG artifacts (1-100).
    pub jpeg_quality: u8,
    /// Occlusion shape for both image and document targets.
    pub occlusion: OcclusionPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            module_px: 8,
            margin_modules: 1,
            jpeg_quality: 92,
            occlusion: OcclusionPolicy::Quadrilateral,
        }
    }
}
