// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF page editor — paints out a region of an existing page and draws a new
// QR image over it, then re-serializes the whole document.

use image::GrayImage;
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::{Quad, Rect};
use tracing::{debug, info, instrument};

use super::reader::{PdfReader, inherited_resources, resolve_in};
use super::writer::{gray_image_xobject, pdf_number};

/// Prefix of the XObject names given to embedded replacement codes.
const XOBJECT_PREFIX: &str = "QrSwap";

/// Area painted white before the new code is drawn, in page points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occlusion {
    Quad(Quad),
    Rect(Rect),
}

impl Occlusion {
    fn path(&self) -> String {
        match self {
            Occlusion::Quad(quad) => {
                let [a, b, c, d] = quad.corners();
                format!(
                    "{} {} m {} {} l {} {} l {} {} l h",
                    pdf_number(a.x),
                    pdf_number(a.y),
                    pdf_number(b.x),
                    pdf_number(b.y),
                    pdf_number(c.x),
                    pdf_number(c.y),
                    pdf_number(d.x),
                    pdf_number(d.y),
                )
            }
            Occlusion::Rect(rect) => format!(
                "{} {} {} {} re",
                pdf_number(rect.x),
                pdf_number(rect.y),
                pdf_number(rect.width),
                pdf_number(rect.height),
            ),
        }
    }
}

/// Mutable copy of a document that page regions can be replaced in.
pub struct PdfEditor {
    document: Document,
}

impl PdfEditor {
    /// Start editing a copy of the reader's document.
    pub fn open(reader: &PdfReader<'_>) -> Self {
        Self {
            document: reader.document().clone(),
        }
    }

    /// Replace a region of a 1-indexed page.
    ///
    /// The page's existing content is wrapped in `q`/`Q` so its graphics state
    /// cannot leak into the overlay. The overlay fills `occlusion` white and
    /// then draws `qr` as a DeviceGray image scaled into `placement`.
    #[instrument(skip(self, occlusion, qr))]
    pub fn replace_region(
        &mut self,
        page: u32,
        occlusion: &Occlusion,
        placement: Rect,
        qr: &GrayImage,
    ) -> Result<()> {
        if !(placement.width > 0.0 && placement.height > 0.0)
            || ![placement.x, placement.y, placement.width, placement.height]
                .iter()
                .all(|v| v.is_finite())
        {
            return Err(QrSwapError::Geometry(format!(
                "cannot place a code in a {}x{} region",
                placement.width, placement.height
            )));
        }

        let pages = self.document.get_pages();
        let page_count = pages.len() as u32;
        let page_id = *pages
            .get(&page)
            .ok_or(QrSwapError::PageRange { page, page_count })?;

        let existing = self.document.get_page_content(page_id).map_err(|err| {
            QrSwapError::Decode(format!("cannot read content of page {}: {}", page, err))
        })?;

        // Resources are copied inline so dictionaries shared with other pages
        // keep their original entries.
        let mut resources = inherited_resources(&self.document, page_id);
        let mut xobjects = match resources.get(b"XObject").ok() {
            Some(obj) => match resolve_in(&self.document, obj) {
                Object::Dictionary(dict) => dict.clone(),
                _ => Dictionary::new(),
            },
            None => Dictionary::new(),
        };
        let name = unused_name(&xobjects);

        let image_id = self.document.add_object(gray_image_xobject(qr)?);
        xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
        resources.set("XObject", Object::Dictionary(xobjects));

        let overlay = format!(
            "q 1 g {} f Q\nq {} 0 0 {} {} {} cm /{} Do Q\n",
            occlusion.path(),
            pdf_number(placement.width),
            pdf_number(placement.height),
            pdf_number(placement.x),
            pdf_number(placement.y),
            name,
        );
        let mut content = Vec::with_capacity(existing.len() + overlay.len() + 8);
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(&existing);
        content.extend_from_slice(b"\nQ\n");
        content.extend_from_slice(overlay.as_bytes());
        let content_id = self.document.add_object(Stream::new(dictionary! {}, content));

        let page_dict = self
            .document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| {
                QrSwapError::Decode(format!("page {} is not a dictionary: {}", page, err))
            })?;
        page_dict.set("Contents", Object::Reference(content_id));
        page_dict.set("Resources", Object::Dictionary(resources));

        debug!(
            page,
            xobject = %name,
            x = placement.x,
            y = placement.y,
            width = placement.width,
            height = placement.height,
            "Page region replaced"
        );
        Ok(())
    }

    /// Serialize the edited document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|err| QrSwapError::Serialization(format!("failed to save PDF: {}", err)))?;
        info!(bytes = output.len(), "Edited PDF serialized");
        Ok(output)
    }
}

fn unused_name(xobjects: &Dictionary) -> String {
    (0..)
        .map(|n| format!("{XOBJECT_PREFIX}{n}"))
        .find(|candidate| !xobjects.has(candidate.as_bytes()))
        .unwrap_or_else(|| XOBJECT_PREFIX.to_string())
}
