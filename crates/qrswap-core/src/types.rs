// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: media kinds, planar geometry, and QR detections.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QrSwapError;

/// Supported input artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Pdf,
    Png,
    Jpeg,
}

impl MediaKind {
    /// MIME type string for this kind.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// Parse a declared MIME type. Anything outside PDF/PNG/JPEG is rejected.
    pub fn from_mime(mime: &str) -> Result<Self, QrSwapError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Ok(Self::Pdf),
            "image/png" => Ok(Self::Png),
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            _ => Err(QrSwapError::UnsupportedType(mime.to_string())),
        }
    }

    /// Infer the kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    /// Paginated kinds go through the page renderer; rasters are scanned directly.
    pub fn is_paginated(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// A point in a 2D coordinate space (pixels or PDF points depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle anchored at its minimum corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Quadrilateral outline of a detected code.
///
/// Corners are named relative to the code's own orientation, so `top_left`
/// is the corner next to the first finder pattern even when the code is
/// rotated in the plane. `corners()` walks them clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    /// An axis-aligned quad covering `rect`.
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            top_left: Point::new(rect.x, rect.y),
            top_right: Point::new(rect.right(), rect.y),
            bottom_right: Point::new(rect.right(), rect.bottom()),
            bottom_left: Point::new(rect.x, rect.bottom()),
        }
    }

    /// Corners in clockwise order starting at the top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Length of the top edge.
    pub fn width(&self) -> f64 {
        self.top_left.distance(&self.top_right)
    }

    /// Length of the left edge.
    pub fn height(&self) -> f64 {
        self.top_left.distance(&self.bottom_left)
    }

    /// Axis-aligned bounding box over all four corners.
    pub fn bounding_box(&self) -> Rect {
        let corners = self.corners();
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Apply `f` to every corner, keeping the corner roles.
    pub fn map(&self, f: impl Fn(Point) -> Point) -> Self {
        Self {
            top_left: f(self.top_left),
            top_right: f(self.top_right),
            bottom_right: f(self.bottom_right),
            bottom_left: f(self.bottom_left),
        }
    }
}

/// Identifier of a detection, unique within the scan that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetectionId {
    /// Sequence number of the scan call.
    pub scan: u64,
    /// Position within that scan's result list.
    pub index: u32,
}

impl std::fmt::Display for DetectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "qr-{}-{}", self.scan, self.index)
    }
}

impl FromStr for DetectionId {
    type Err = QrSwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QrSwapError::InvalidDetectionId(s.to_string());
        let rest = s.strip_prefix("qr-").ok_or_else(invalid)?;
        let (scan, index) = rest.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            scan: scan.parse().map_err(|_| invalid())?,
            index: index.parse().map_err(|_| invalid())?,
        })
    }
}

/// One decoded QR code and where it sits in the scanned raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    /// Decoded text as reported by the decoder.
    pub payload: String,
    /// Outline in the scanned raster's pixel space.
    pub quad: Quad,
    /// 1-based page number for paginated artifacts.
    pub page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Quad {
        Quad::from_rect(Rect {
            x,
            y,
            width: side,
            height: side,
        })
    }

    #[test]
    fn mime_parsing_accepts_supported_kinds() {
        assert_eq!(MediaKind::from_mime("application/pdf").unwrap(), MediaKind::Pdf);
        assert_eq!(MediaKind::from_mime("IMAGE/PNG").unwrap(), MediaKind::Png);
        assert_eq!(
            MediaKind::from_mime("image/jpeg; charset=binary").unwrap(),
            MediaKind::Jpeg
        );
    }

    #[test]
    fn mime_parsing_rejects_everything_else() {
        let err = MediaKind::from_mime("image/gif").unwrap_err();
        assert!(matches!(err, QrSwapError::UnsupportedType(ref m) if m == "image/gif"));
    }

    #[test]
    fn only_pdf_is_paginated() {
        assert!(MediaKind::Pdf.is_paginated());
        assert!(!MediaKind::Png.is_paginated());
        assert!(!MediaKind::Jpeg.is_paginated());
    }

    #[test]
    fn quad_edges() {
        let quad = square(10.0, 20.0, 30.0);
        assert!((quad.width() - 30.0).abs() < 1e-9);
        assert!((quad.height() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn rotated_quad_bbox_is_larger_than_edges() {
        // Square of side 10 rotated by 45 degrees around (50, 50).
        let h = 10.0 / 2f64.sqrt();
        let quad = Quad {
            top_left: Point::new(50.0 - h, 50.0),
            top_right: Point::new(50.0, 50.0 - h),
            bottom_right: Point::new(50.0 + h, 50.0),
            bottom_left: Point::new(50.0, 50.0 + h),
        };
        let bbox = quad.bounding_box();
        assert!((quad.width() - 10.0).abs() < 1e-9);
        assert!((bbox.width - 2.0 * h).abs() < 1e-9);
        assert!((bbox.x - (50.0 - h)).abs() < 1e-9);
        assert!((bbox.y - (50.0 - h)).abs() < 1e-9);
    }

    #[test]
    fn detection_id_round_trips_through_display() {
        let id = DetectionId { scan: 42, index: 3 };
        assert_eq!(id.to_string(), "qr-42-3");
        assert_eq!("qr-42-3".parse::<DetectionId>().unwrap(), id);
        assert!("42-3".parse::<DetectionId>().is_err());
        assert!(matches!(
            "qr-x-3".parse::<DetectionId>(),
            Err(QrSwapError::InvalidDetectionId(raw)) if raw == "qr-x-3"
        ));
    }
}
