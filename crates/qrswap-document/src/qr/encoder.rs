// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR encoder — renders replacement codes at error-correction level H.

use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};
use qrswap_core::config::PipelineConfig;
use qrswap_core::error::{QrSwapError, Result};
use tracing::{debug, instrument};

/// Largest payloads a level-H symbol (version 40) can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityHint {
    pub numeric: usize,
    pub alphanumeric: usize,
    pub bytes: usize,
}

/// Generates replacement QR rasters.
#[derive(Debug, Clone, Copy)]
pub struct QrEncoder {
    module_px: u32,
    margin_modules: u32,
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl QrEncoder {
    pub fn new(module_px: u32, margin_modules: u32) -> Self {
        Self {
            module_px: module_px.max(1),
            margin_modules,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.module_px, config.margin_modules)
    }

    pub fn capacity_hint() -> CapacityHint {
        CapacityHint {
            numeric: 3057,
            alphanumeric: 1852,
            bytes: 1273,
        }
    }

    /// Encode `text` into a black-on-white luma raster.
    ///
    /// Empty text is a valid payload. Text beyond level-H capacity fails with
    /// `QrSwapError::Encoding`.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn encode(&self, text: &str) -> Result<GrayImage> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H)
            .map_err(|err| QrSwapError::Encoding(format!("{} ({} bytes)", err, text.len())))?;

        let modules = code.width() as u32;
        let side = (modules + 2 * self.margin_modules) * self.module_px;
        let mut raster = GrayImage::from_pixel(side, side, Luma([255]));

        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color != Color::Dark {
                continue;
            }
            let mx = i as u32 % modules + self.margin_modules;
            let my = i as u32 / modules + self.margin_modules;
            for dy in 0..self.module_px {
                for dx in 0..self.module_px {
                    raster.put_pixel(mx * self.module_px + dx, my * self.module_px + dy, Luma([0]));
                }
            }
        }

        debug!(modules, side, "QR code rendered");
        Ok(raster)
    }
}
