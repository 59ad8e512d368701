// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Coordinate transform — maps a detected quadrilateral from the scanned
// raster's pixel space into the space the replacement is drawn in.
//
// Raster space has its origin at the top-left with y growing downward. PDF
// user space has its origin at the bottom-left of the MediaBox with y growing
// upward, and is `render_scale` times smaller than the rendered raster.

use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::{Point, Quad, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A page's MediaBox in PDF points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PageBox {
    /// US Letter, used when a page declares no usable MediaBox.
    pub const LETTER: PageBox = PageBox {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    /// A zero-origin box of the given size.
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            x0: 0.0,
            y0: 0.0,
            x1: width,
            y1: height,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Convert a raster pixel (rendered at `scale`) to a point in page space.
    pub fn raster_to_page(&self, point: Point, scale: f64) -> Point {
        Point::new(self.x0 + point.x / scale, self.y1 - point.y / scale)
    }
}

/// The space a replacement is placed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetSpace {
    /// PDF page points for a page rendered at `scale`.
    Document { scale: f64, page: PageBox },
    /// The scanned image's own pixel space.
    Image,
}

/// Compute the placement rectangle for `quad` in `target` space.
///
/// Width and height are the lengths of the quad's top and left edges (divided
/// by the render scale for documents). The document origin is the top-left
/// corner flipped into y-up space and dropped by the height, so the returned
/// rectangle's `y` is its bottom edge. The image origin is the bounding box
/// minimum, since image placement always draws axis-aligned.
pub fn to_target(quad: &Quad, target: TargetSpace) -> Result<Rect> {
    let rect = match target {
        TargetSpace::Document { scale, page } => {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(QrSwapError::Geometry(format!(
                    "render scale must be positive, got {scale}"
                )));
            }
            let width = quad.width() / scale;
            let height = quad.height() / scale;
            let origin = page.raster_to_page(quad.top_left, scale);
            Rect {
                x: origin.x,
                y: origin.y - height,
                width,
                height,
            }
        }
        TargetSpace::Image => {
            let bbox = quad.bounding_box();
            Rect {
                x: bbox.x,
                y: bbox.y,
                width: quad.width(),
                height: quad.height(),
            }
        }
    };

    ensure_drawable(&rect)?;
    debug!(
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        "Placement computed"
    );
    Ok(rect)
}

/// Map every corner of `quad` into page space. Corner roles are preserved;
/// after the y flip the quad winds counter-clockwise in page coordinates.
pub fn quad_to_document(quad: &Quad, scale: f64, page: PageBox) -> Result<Quad> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(QrSwapError::Geometry(format!(
            "render scale must be positive, got {scale}"
        )));
    }
    Ok(quad.map(|p| page.raster_to_page(p, scale)))
}

fn ensure_drawable(rect: &Rect) -> Result<()> {
    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(QrSwapError::Geometry(format!(
            "placement {}x{} at ({}, {}) has no area",
            rect.width, rect.height, rect.x, rect.y
        )));
    }
    Ok(())
}
