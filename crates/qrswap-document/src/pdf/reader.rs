// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open a document with `lopdf` and answer the page-level
// questions the rasterizer and editor need: page count, MediaBox, resources,
// and decoded content operations.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use qrswap_core::error::{QrSwapError, Result};
use tracing::{debug, instrument, warn};

use crate::geometry::PageBox;

/// Deepest `/Parent` chain followed when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 32;

static NULL: Object = Object::Null;

/// Read-only view over a parsed PDF document.
#[derive(Debug, Clone)]
pub struct PdfReader<'a> {
    document: Document,
    /// The bytes the document was parsed from.
    source: &'a [u8],
}

impl<'a> PdfReader<'a> {
    // -- Construction ---------------------------------------------------------

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &'a [u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| QrSwapError::Decode(format!("failed to load PDF: {}", err)))?;

        let pages = document.get_pages().len();
        if pages == 0 {
            return Err(QrSwapError::Decode("PDF has no pages".into()));
        }
        debug!(pages, "PDF loaded from bytes");

        Ok(Self {
            document,
            source: data,
        })
    }

    /// The underlying lopdf document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The serialized document this reader was created from.
    pub fn source_bytes(&self) -> &'a [u8] {
        self.source
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Fail with `PageRange` unless `page` is within `[1, page_count]`.
    pub fn check_page(&self, page: u32) -> Result<()> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(QrSwapError::PageRange { page, page_count });
        }
        Ok(())
    }

    /// Object id of a 1-indexed page.
    pub fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.check_page(page)?;
        self.document
            .get_pages()
            .get(&page)
            .copied()
            .ok_or_else(|| QrSwapError::Decode(format!("page {} missing from page tree", page)))
    }

    /// The page's MediaBox, inherited through `/Parent` and normalised so
    /// that `x0 < x1` and `y0 < y1`. US Letter when absent or malformed.
    pub fn page_box(&self, page: u32) -> Result<PageBox> {
        let page_id = self.page_id(page)?;
        let Some(media_box) = self.inherited(page_id, b"MediaBox") else {
            warn!(page, "Page has no MediaBox, assuming US Letter");
            return Ok(PageBox::LETTER);
        };

        let values: Vec<f64> = match self.resolve(media_box) {
            Object::Array(items) => items
                .iter()
                .filter_map(|item| number(self.resolve(item)))
                .collect(),
            _ => Vec::new(),
        };
        let [a, b, c, d] = values.as_slice() else {
            warn!(page, "Malformed MediaBox, assuming US Letter");
            return Ok(PageBox::LETTER);
        };

        let page_box = PageBox {
            x0: a.min(*c),
            y0: b.min(*d),
            x1: a.max(*c),
            y1: b.max(*d),
        };
        if page_box.width() <= 0.0 || page_box.height() <= 0.0 {
            warn!(page, "Empty MediaBox, assuming US Letter");
            return Ok(PageBox::LETTER);
        }
        Ok(page_box)
    }

    /// The page's resource dictionary, inherited through `/Parent`. Empty when
    /// the page declares none.
    pub fn page_resources(&self, page: u32) -> Result<Dictionary> {
        let page_id = self.page_id(page)?;
        Ok(self.resources_of(page_id))
    }

    /// Decoded content-stream operations of a page, in drawing order.
    pub fn page_operations(&self, page: u32) -> Result<Vec<Operation>> {
        let page_id = self.page_id(page)?;
        let bytes = self.document.get_page_content(page_id).map_err(|err| {
            QrSwapError::Decode(format!("cannot read content of page {}: {}", page, err))
        })?;
        let content = Content::decode(&bytes).map_err(|err| {
            QrSwapError::Decode(format!("cannot parse content of page {}: {}", page, err))
        })?;
        Ok(content.operations)
    }

    // -- Object helpers -------------------------------------------------------

    /// Follow references until a direct object is reached. Dangling
    /// references resolve to `Null`.
    pub fn resolve<'o>(&'o self, object: &'o Object) -> &'o Object {
        resolve_in(&self.document, object)
    }

    /// Look `key` up in a dictionary and resolve the value.
    pub fn lookup<'o>(&'o self, dict: &'o Dictionary, key: &[u8]) -> Option<&'o Object> {
        dict.get(key).ok().map(|value| self.resolve(value))
    }

    fn resources_of(&self, page_id: ObjectId) -> Dictionary {
        inherited_resources(&self.document, page_id)
    }

    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        inherited_in(&self.document, page_id, key)
    }
}

/// Follow references in `document` until a direct object is reached.
pub(crate) fn resolve_in<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            Object::Reference(id) => match document.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return &NULL,
            },
            _ => return current,
        }
    }
    &NULL
}

/// Find an attribute on the page node or the nearest ancestor carrying it.
pub(crate) fn inherited_in<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(node_id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => node_id = *parent,
            _ => return None,
        }
    }
    None
}

/// A page's effective resource dictionary as an owned copy.
pub(crate) fn inherited_resources(document: &Document, page_id: ObjectId) -> Dictionary {
    match inherited_in(document, page_id, b"Resources").map(|obj| resolve_in(document, obj)) {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    }
}

/// Numeric value of an `Integer` or `Real` object.
pub(crate) fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    fn ints(values: &[i64]) -> Vec<Object> {
        values.iter().map(|v| Object::Integer(*v)).collect()
    }

    /// Minimal document whose MediaBox lives on the /Pages node.
    fn inherited_box_pdf(media_box: Vec<Object>, pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for _ in 0..pages {
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, b"0 g 0 0 10 10 re f".to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => media_box,
                "Resources" => dictionary! {},
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn media_box_is_inherited_from_parent() {
        let bytes = inherited_box_pdf(ints(&[0, 0, 595, 842]), 2);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert_eq!(reader.page_box(2).unwrap(), PageBox::sized(595.0, 842.0));
    }

    #[test]
    fn media_box_corners_are_normalised() {
        let bytes = inherited_box_pdf(
            vec![Object::Real(110.0), 220i64.into(), 10i64.into(), 20i64.into()],
            1,
        );
        let page_box = PdfReader::from_bytes(&bytes).unwrap().page_box(1).unwrap();
        assert_eq!(
            page_box,
            PageBox {
                x0: 10.0,
                y0: 20.0,
                x1: 110.0,
                y1: 220.0,
            }
        );
    }

    #[test]
    fn malformed_media_box_falls_back_to_letter() {
        let bytes = inherited_box_pdf(ints(&[0, 0]), 1);
        let page_box = PdfReader::from_bytes(&bytes).unwrap().page_box(1).unwrap();
        assert_eq!(page_box, PageBox::LETTER);
    }

    #[test]
    fn page_bounds_are_checked() {
        let bytes = inherited_box_pdf(ints(&[0, 0, 100, 100]), 3);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        for bad in [0, 4, 99] {
            match reader.check_page(bad) {
                Err(QrSwapError::PageRange { page, page_count }) => {
                    assert_eq!(page, bad);
                    assert_eq!(page_count, 3);
                }
                other => panic!("expected PageRange, got {other:?}"),
            }
        }
        assert!(reader.check_page(3).is_ok());
    }

    #[test]
    fn content_operations_are_decoded() {
        let bytes = inherited_box_pdf(ints(&[0, 0, 100, 100]), 1);
        let ops = PdfReader::from_bytes(&bytes).unwrap().page_operations(1).unwrap();
        let names: Vec<_> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(names, ["g", "re", "f"]);
    }

    #[test]
    fn source_bytes_borrow_the_input() {
        let bytes = inherited_box_pdf(ints(&[0, 0, 100, 100]), 1);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(std::ptr::eq(reader.source_bytes(), bytes.as_slice()));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = PdfReader::from_bytes(b"%PDF-nonsense").unwrap_err();
        assert!(matches!(err, QrSwapError::Decode(_)));
    }
}
