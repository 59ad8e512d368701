// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR decoder adapter — runs a detector backend over a raster and normalizes
// whatever shape it returns into a list of `Detection`s with fresh ids.

use std::sync::atomic::{AtomicU64, Ordering};

use image::{DynamicImage, GrayImage, RgbaImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use qrswap_core::error::Result;
use qrswap_core::types::{Detection, DetectionId, Point, Quad};
use tracing::{debug, info, instrument, warn};

static SCAN_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// One code as reported by a backend, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub payload: String,
    /// Corners in top-left, top-right, bottom-right, bottom-left order.
    pub corners: [Point; 4],
}

/// Backends report either nothing, a single code, or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorOutput {
    Nothing,
    Single(RawDetection),
    Many(Vec<RawDetection>),
}

impl DetectorOutput {
    pub fn into_vec(self) -> Vec<RawDetection> {
        match self {
            DetectorOutput::Nothing => Vec::new(),
            DetectorOutput::Single(raw) => vec![raw],
            DetectorOutput::Many(all) => all,
        }
    }
}

/// A QR detection backend.
pub trait QrDetector: Send + Sync {
    fn detect(&self, raster: &RgbaImage) -> Result<DetectorOutput>;
}

/// Turn a backend's output into detections stamped with one scan number.
pub fn normalize(output: DetectorOutput, page: Option<u32>) -> Vec<Detection> {
    let scan = SCAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    output
        .into_vec()
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let [top_left, top_right, bottom_right, bottom_left] = raw.corners;
            Detection {
                id: DetectionId {
                    scan,
                    index: index as u32,
                },
                payload: raw.payload,
                quad: Quad {
                    top_left,
                    top_right,
                    bottom_right,
                    bottom_left,
                },
                page,
            }
        })
        .collect()
}

/// Pure-Rust backend built on `rqrr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDetector;

impl RqrrDetector {
    fn detect_gray(gray: &GrayImage) -> Vec<RawDetection> {
        let (width, height) = gray.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                gray.get_pixel(x as u32, y as u32).0[0]
            });

        let grids = prepared.detect_grids();
        let mut found = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    debug!(
                        version = meta.version.0,
                        ecc_level = meta.ecc_level,
                        len = content.len(),
                        "Decoded QR grid"
                    );
                    let corner = |i: usize| {
                        Point::new(f64::from(grid.bounds[i].x), f64::from(grid.bounds[i].y))
                    };
                    found.push(RawDetection {
                        payload: content,
                        corners: [corner(0), corner(1), corner(2), corner(3)],
                    });
                }
                Err(err) => {
                    warn!("Failed to decode one QR grid: {:?}", err);
                }
            }
        }
        found
    }
}

impl QrDetector for RqrrDetector {
    #[instrument(skip_all, fields(width = raster.width(), height = raster.height()))]
    fn detect(&self, raster: &RgbaImage) -> Result<DetectorOutput> {
        if raster.width() == 0 || raster.height() == 0 {
            return Ok(DetectorOutput::Nothing);
        }
        let gray = DynamicImage::ImageRgba8(raster.clone()).to_luma8();

        let mut found = Self::detect_gray(&gray);
        if found.is_empty() {
            debug!("No grids on first pass, retrying on binarized raster");
            found = Self::detect_gray(&binarize(&gray));
        }

        Ok(match found.len() {
            0 => DetectorOutput::Nothing,
            1 => DetectorOutput::Single(found.remove(0)),
            _ => DetectorOutput::Many(found),
        })
    }
}

/// Global Otsu binarization, for codes printed over busy backgrounds.
fn binarize(gray: &GrayImage) -> GrayImage {
    threshold(gray, otsu_level(gray), ThresholdType::Binary)
}

/// Detector plus normalization.
pub struct QrDecoder {
    detector: Box<dyn QrDetector>,
}

impl std::fmt::Debug for QrDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrDecoder").finish_non_exhaustive()
    }
}

impl Default for QrDecoder {
    fn default() -> Self {
        Self::new(Box::new(RqrrDetector))
    }
}

impl QrDecoder {
    pub fn new(detector: Box<dyn QrDetector>) -> Self {
        Self { detector }
    }

    /// Decode every QR code in `raster`. Finding none is an empty list.
    pub fn scan(&self, raster: &RgbaImage, page: Option<u32>) -> Result<Vec<Detection>> {
        let output = self.detector.detect(raster)?;
        let detections = normalize(output, page);
        info!(count = detections.len(), ?page, "QR scan complete");
        Ok(detections)
    }
}
