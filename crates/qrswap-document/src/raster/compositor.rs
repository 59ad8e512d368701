// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster compositor — paints out a detected code and draws its replacement.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use qrswap_core::config::OcclusionPolicy;
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::Quad;
use tracing::{debug, instrument};

use super::fill::{fill_polygon, fill_rect};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Composites a replacement QR raster over an existing raster.
///
/// Each call works on its own surface; nothing is shared between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCompositor {
    policy: OcclusionPolicy,
}

impl RasterCompositor {
    pub fn new(policy: OcclusionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> OcclusionPolicy {
        self.policy
    }

    /// Produce a copy of `original` with the code at `quad` replaced.
    ///
    /// 1. The original is drawn onto a fresh surface of the same size.
    /// 2. The occlusion shape is filled white: the true quadrilateral by
    ///    default, or its bounding box under `OcclusionPolicy::BoundingBox`.
    /// 3. `replacement` is scaled (nearest neighbour) to exactly fill the
    ///    quad's axis-aligned bounding box. Rotation is not reproduced.
    #[instrument(skip_all, fields(policy = ?self.policy))]
    pub fn composite(
        &self,
        original: &RgbaImage,
        quad: &Quad,
        replacement: &GrayImage,
    ) -> Result<RgbaImage> {
        let (width, height) = original.dimensions();
        if width == 0 || height == 0 {
            return Err(QrSwapError::Canvas(format!(
                "cannot draw onto a {}x{} surface",
                width, height
            )));
        }
        if replacement.width() == 0 || replacement.height() == 0 {
            return Err(QrSwapError::Canvas("replacement raster is empty".into()));
        }

        let bbox = quad.bounding_box();
        let x0 = bbox.x.round();
        let y0 = bbox.y.round();
        let x1 = bbox.right().round();
        let y1 = bbox.bottom().round();
        if !(x1 - x0 >= 1.0 && y1 - y0 >= 1.0) {
            return Err(QrSwapError::Geometry(format!(
                "bounding box {}x{} is too small to draw into",
                bbox.width, bbox.height
            )));
        }
        if x1 <= 0.0 || y1 <= 0.0 || x0 >= width as f64 || y0 >= height as f64 {
            return Err(QrSwapError::Canvas(format!(
                "placement ({x0}, {y0})-({x1}, {y1}) lies outside the {width}x{height} surface"
            )));
        }

        let mut surface = RgbaImage::from_pixel(width, height, WHITE);
        imageops::replace(&mut surface, original, 0, 0);

        match self.policy {
            OcclusionPolicy::Quadrilateral => {
                fill_polygon(&mut surface, &quad.corners(), WHITE);
            }
            OcclusionPolicy::BoundingBox => {
                fill_rect(&mut surface, bbox, WHITE);
            }
        }

        let target_w = (x1 - x0) as u32;
        let target_h = (y1 - y0) as u32;
        let qr_rgba = DynamicImage::ImageLuma8(replacement.clone()).to_rgba8();
        let scaled = imageops::resize(&qr_rgba, target_w, target_h, FilterType::Nearest);
        imageops::replace(&mut surface, &scaled, x0 as i64, y0 as i64);

        debug!(x0, y0, target_w, target_h, "Replacement composited");
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use qrswap_core::types::{Point, Rect};

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const RED: Rgba<u8> = Rgba([200, 0, 0, 255]);

    fn black_replacement() -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([0]))
    }

    fn diamond(cx: f64, cy: f64, r: f64) -> Quad {
        Quad {
            top_left: Point::new(cx - r, cy),
            top_right: Point::new(cx, cy - r),
            bottom_right: Point::new(cx + r, cy),
            bottom_left: Point::new(cx, cy + r),
        }
    }

    #[test]
    fn replacement_fills_the_bounding_box() {
        let original = RgbaImage::from_pixel(50, 50, RED);
        let quad = Quad::from_rect(Rect {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
        });
        let out = RasterCompositor::default()
            .composite(&original, &quad, &black_replacement())
            .unwrap();

        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(*out.get_pixel(10, 10), BLACK);
        assert_eq!(*out.get_pixel(29, 29), BLACK);
        assert_eq!(*out.get_pixel(30, 30), RED);
        assert_eq!(*out.get_pixel(9, 10), RED);
    }

    #[test]
    fn both_policies_leave_pixels_outside_the_bbox_alone() {
        let original = RgbaImage::from_pixel(60, 60, RED);
        let quad = diamond(30.0, 30.0, 20.0);

        for policy in [OcclusionPolicy::Quadrilateral, OcclusionPolicy::BoundingBox] {
            let out = RasterCompositor::new(policy)
                .composite(&original, &quad, &black_replacement())
                .unwrap();
            assert_eq!(*out.get_pixel(5, 5), RED);
            assert_eq!(*out.get_pixel(55, 55), RED);
            assert_eq!(*out.get_pixel(30, 30), BLACK);
        }
    }

    #[test]
    fn empty_surface_is_a_canvas_error() {
        let original = RgbaImage::new(0, 0);
        let quad = diamond(1.0, 1.0, 1.0);
        let err = RasterCompositor::default()
            .composite(&original, &quad, &black_replacement())
            .unwrap_err();
        assert!(matches!(err, QrSwapError::Canvas(_)));
    }

    #[test]
    fn placement_off_canvas_is_a_canvas_error() {
        let original = RgbaImage::from_pixel(20, 20, RED);
        let quad = Quad::from_rect(Rect {
            x: 100.0,
            y: 100.0,
            width: 10.0,
            height: 10.0,
        });
        let err = RasterCompositor::default()
            .composite(&original, &quad, &black_replacement())
            .unwrap_err();
        assert!(matches!(err, QrSwapError::Canvas(_)));
    }

    #[test]
    fn collapsed_quad_is_a_geometry_error() {
        let original = RgbaImage::from_pixel(20, 20, RED);
        let p = Point::new(5.0, 5.0);
        let quad = Quad {
            top_left: p,
            top_right: p,
            bottom_right: p,
            bottom_left: p,
        };
        let err = RasterCompositor::default()
            .composite(&original, &quad, &black_replacement())
            .unwrap_err();
        assert!(matches!(err, QrSwapError::Geometry(_)));
    }

    #[test]
    fn original_pixels_survive_outside_the_code() {
        let original = RgbaImage::from_fn(30, 30, |x, _| {
            if x < 15 { RED } else { Rgba([0, 0, 200, 255]) }
        });
        let quad = Quad::from_rect(Rect {
            x: 20.0,
            y: 20.0,
            width: 5.0,
            height: 5.0,
        });
        let out = RasterCompositor::default()
            .composite(&original, &quad, &GrayImage::from_pixel(1, 1, Luma([0])))
            .unwrap();
        assert_eq!(out.get_pixel(2, 2), original.get_pixel(2, 2));
        assert_eq!(out.get_pixel(18, 2), original.get_pixel(18, 2));
        assert_eq!(*out.get_pixel(22, 22), BLACK);
    }
}
