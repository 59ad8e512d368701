// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — build documents from rasters with `lopdf`, and the image
// XObject helpers shared with the page editor.

use image::{DynamicImage, GrayImage, RgbaImage};
use lopdf::{Document, Object, Stream, dictionary};
use qrswap_core::error::{QrSwapError, Result};
use tracing::{debug, info, instrument};

/// Creates new PDF documents from raster images.
pub struct PdfWriter;

impl PdfWriter {
    /// Build a PDF with one page per raster, each image filling its page.
    ///
    /// Page size follows the raster at `dpi` (72 gives one point per pixel).
    #[instrument(skip(images), fields(image_count = images.len()))]
    pub fn create_from_images(images: &[RgbaImage], dpi: f64) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(QrSwapError::Serialization(
                "no images to put into the document".into(),
            ));
        }
        if !(dpi.is_finite() && dpi > 0.0) {
            return Err(QrSwapError::Serialization(format!(
                "dpi must be positive, got {dpi}"
            )));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(images.len());

        for (index, img) in images.iter().enumerate() {
            let width_pt = img.width() as f64 * 72.0 / dpi;
            let height_pt = img.height() as f64 * 72.0 / dpi;

            let image_id = doc.add_object(rgb_image_xobject(img)?);
            let content = format!(
                "q {} 0 0 {} 0 0 cm /Im0 Do Q",
                pdf_number(width_pt),
                pdf_number(height_pt)
            );
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    Object::Real(width_pt as f32),
                    Object::Real(height_pt as f32),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        "Im0" => image_id,
                    },
                },
            });
            kids.push(Object::Reference(page_id));
            debug!(page = index + 1, width_pt, height_pt, "Image page added");
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| QrSwapError::Serialization(format!("failed to write PDF: {}", err)))?;

        info!(pages = page_count, bytes = output.len(), "PDF created from images");
        Ok(output)
    }
}

/// Flate-compressed DeviceRGB image XObject. Alpha is dropped.
pub(crate) fn rgb_image_xobject(img: &RgbaImage) -> Result<Stream> {
    let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
    image_xobject(img.width(), img.height(), "DeviceRGB", rgb.into_raw())
}

/// Flate-compressed DeviceGray image XObject.
pub(crate) fn gray_image_xobject(img: &GrayImage) -> Result<Stream> {
    image_xobject(img.width(), img.height(), "DeviceGray", img.as_raw().clone())
}

fn image_xobject(width: u32, height: u32, color_space: &str, samples: Vec<u8>) -> Result<Stream> {
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
            "BitsPerComponent" => 8,
        },
        samples,
    );
    stream
        .compress()
        .map_err(|err| QrSwapError::Serialization(format!("image compression failed: {}", err)))?;
    Ok(stream)
}

/// Format a number for a content stream: fixed precision, no trailing zeros.
pub(crate) fn pdf_number(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
