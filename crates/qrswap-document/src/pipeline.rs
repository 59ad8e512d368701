// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan/replace pipeline — the stateless core that the session drives.
//
// Scanning renders (documents) or decodes (images) one page and runs the QR
// decoder over it. Replacing encodes the new text, maps the detection into
// the target space, and either composites the raster or edits the page.

use image::RgbaImage;
use qrswap_core::config::{OcclusionPolicy, PipelineConfig};
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::{Detection, MediaKind};
use tracing::{info, instrument, warn};

use crate::geometry::{TargetSpace, quad_to_document, to_target};
use crate::pdf::{Occlusion, PageRasterizer, PdfEditor, PdfReader, default_rasterizer};
use crate::qr::{QrDecoder, QrDetector, QrEncoder};
use crate::raster::codec::{decode_raster, encode_png, encode_raster};
use crate::raster::compositor::RasterCompositor;

/// A page as a raster, together with the scale it was produced at.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub raster: RgbaImage,
    /// Pixels per document point; 1.0 for image artifacts.
    pub scale: f64,
    /// 1-based page number.
    pub page: u32,
    /// Page content the rasterizer could not draw. Codes inside it are
    /// invisible to a scan.
    pub skipped: usize,
}

impl RenderedPage {
    /// PNG encoding of the raster, for previews.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        encode_png(&self.raster)
    }
}

/// Result of scanning one page.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub detections: Vec<Detection>,
    pub preview: RenderedPage,
    /// Total pages for paginated artifacts.
    pub page_count: Option<u32>,
}

impl ScanOutcome {
    /// Whether every painting operation on the page was rendered, so an empty
    /// result means the page really has no codes.
    pub fn is_complete(&self) -> bool {
        self.preview.skipped == 0
    }
}

/// Result of replacing one code.
#[derive(Debug, Clone)]
pub struct ReplaceOutcome {
    /// The modified artifact, in the same media kind as the input.
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
    pub preview: RenderedPage,
}

/// Stateless scan/replace engine. Safe to share between threads.
pub struct QrPipeline {
    config: PipelineConfig,
    rasterizer: Box<dyn PageRasterizer>,
    decoder: QrDecoder,
}

impl std::fmt::Debug for QrPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for QrPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl QrPipeline {
    /// Pipeline with PDFium (or the built-in fallback) and the rqrr detector.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            rasterizer: default_rasterizer(),
            decoder: QrDecoder::default(),
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Box<dyn PageRasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn QrDetector>) -> Self {
        self.decoder = QrDecoder::new(detector);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // -- Scan -----------------------------------------------------------------

    /// Render or decode `page` of the artifact and find its QR codes.
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub fn scan(&self, bytes: &[u8], kind: MediaKind, page: u32) -> Result<ScanOutcome> {
        let (preview, page_count) = self.render(bytes, kind, page)?;
        let page_tag = kind.is_paginated().then_some(page);
        let detections = self.decoder.scan(&preview.raster, page_tag)?;

        info!(detections = detections.len(), ?page_count, "Scan finished");
        Ok(ScanOutcome {
            detections,
            preview,
            page_count,
        })
    }

    /// Produce the raster a scan of `page` would decode, without decoding it.
    pub fn render(
        &self,
        bytes: &[u8],
        kind: MediaKind,
        page: u32,
    ) -> Result<(RenderedPage, Option<u32>)> {
        match kind {
            MediaKind::Pdf => {
                let reader = PdfReader::from_bytes(bytes)?;
                reader.check_page(page)?;
                let scale = self.config.render_scale;
                let rendered = self.rasterizer.render_page(&reader, page, scale)?;
                if rendered.skipped > 0 {
                    warn!(
                        page,
                        skipped = rendered.skipped,
                        rasterizer = self.rasterizer.name(),
                        "Page rendered incompletely, codes in skipped content will not be found"
                    );
                }
                Ok((
                    RenderedPage {
                        raster: rendered.image,
                        scale,
                        page,
                        skipped: rendered.skipped,
                    },
                    Some(reader.page_count()),
                ))
            }
            MediaKind::Png | MediaKind::Jpeg => {
                check_image_page(page)?;
                let raster = decode_raster(bytes)?;
                Ok((
                    RenderedPage {
                        raster,
                        scale: 1.0,
                        page,
                        skipped: 0,
                    },
                    None,
                ))
            }
        }
    }

    // -- Replace --------------------------------------------------------------

    /// Replace `detection` on `page` with a code encoding `new_text`.
    ///
    /// The artifact bytes are never modified; a new artifact is returned.
    #[instrument(
        skip(self, bytes, detection, new_text),
        fields(bytes_len = bytes.len(), id = %detection.id)
    )]
    pub fn replace(
        &self,
        bytes: &[u8],
        kind: MediaKind,
        detection: &Detection,
        new_text: &str,
        page: u32,
    ) -> Result<ReplaceOutcome> {
        let encoder = QrEncoder::from_config(&self.config);
        let qr = encoder.encode(new_text)?;

        let outcome = match kind {
            MediaKind::Pdf => self.replace_in_document(bytes, detection, &qr, page)?,
            MediaKind::Png | MediaKind::Jpeg => {
                check_image_page(page)?;
                to_target(&detection.quad, TargetSpace::Image)?;
                let original = decode_raster(bytes)?;
                let composited = RasterCompositor::new(self.config.occlusion).composite(
                    &original,
                    &detection.quad,
                    &qr,
                )?;
                ReplaceOutcome {
                    bytes: encode_raster(&composited, kind, self.config.jpeg_quality)?,
                    kind,
                    preview: RenderedPage {
                        raster: composited,
                        scale: 1.0,
                        page,
                        skipped: 0,
                    },
                }
            }
        };

        info!(output_bytes = outcome.bytes.len(), "Replacement finished");
        Ok(outcome)
    }

    fn replace_in_document(
        &self,
        bytes: &[u8],
        detection: &Detection,
        qr: &image::GrayImage,
        page: u32,
    ) -> Result<ReplaceOutcome> {
        let reader = PdfReader::from_bytes(bytes)?;
        let page_box = reader.page_box(page)?;
        let scale = self.config.render_scale;

        let target = TargetSpace::Document {
            scale,
            page: page_box,
        };
        let placement = to_target(&detection.quad, target)?;
        let page_quad = quad_to_document(&detection.quad, scale, page_box)?;
        let occlusion = match self.config.occlusion {
            OcclusionPolicy::Quadrilateral => Occlusion::Quad(page_quad),
            OcclusionPolicy::BoundingBox => Occlusion::Rect(page_quad.bounding_box()),
        };

        let mut editor = PdfEditor::open(&reader);
        editor.replace_region(page, &occlusion, placement, qr)?;
        let edited = editor.to_bytes()?;

        let edited_reader = PdfReader::from_bytes(&edited)?;
        let rendered = self.rasterizer.render_page(&edited_reader, page, scale)?;
        Ok(ReplaceOutcome {
            bytes: edited,
            kind: MediaKind::Pdf,
            preview: RenderedPage {
                raster: rendered.image,
                scale,
                page,
                skipped: rendered.skipped,
            },
        })
    }
}

fn check_image_page(page: u32) -> Result<()> {
    if page != 1 {
        return Err(QrSwapError::PageRange {
            page,
            page_count: 1,
        });
    }
    Ok(())
}
