// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster codec — decode uploaded images into RGBA working buffers and encode
// composited results back into the artifact's original subtype.

use image::{DynamicImage, ImageFormat, RgbaImage};
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::MediaKind;
use tracing::{debug, instrument};

/// Decode PNG or JPEG bytes into an RGBA buffer.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn decode_raster(data: &[u8]) -> Result<RgbaImage> {
    let img = image::load_from_memory(data)
        .map_err(|err| QrSwapError::Decode(format!("failed to decode image: {}", err)))?;
    debug!(
        width = img.width(),
        height = img.height(),
        "Image decoded from bytes"
    );
    Ok(img.to_rgba8())
}

/// Encode `raster` as `kind`. Only raster kinds can be produced here.
pub fn encode_raster(raster: &RgbaImage, kind: MediaKind, jpeg_quality: u8) -> Result<Vec<u8>> {
    match kind {
        MediaKind::Png => encode_png(raster),
        MediaKind::Jpeg => encode_jpeg(raster, jpeg_quality),
        MediaKind::Pdf => Err(QrSwapError::UnsupportedType(format!(
            "cannot encode a raster as {}",
            kind.mime_type()
        ))),
    }
}

/// Encode as PNG bytes.
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    DynamicImage::ImageRgba8(raster.clone())
        .write_to(&mut cursor, ImageFormat::Png)
        .map_err(|err| QrSwapError::Canvas(format!("PNG encoding failed: {}", err)))?;
    Ok(buffer)
}

/// Encode as JPEG bytes with the given quality (1-100). Alpha is dropped.
pub fn encode_jpeg(raster: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let rgb = DynamicImage::ImageRgba8(raster.clone()).to_rgb8();
    let encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|err| QrSwapError::Canvas(format!("JPEG encoding failed: {}", err)))?;
    Ok(buffer)
}
