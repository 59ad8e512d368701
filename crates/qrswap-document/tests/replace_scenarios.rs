// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end scan/replace scenarios over generated PDFs and images.

use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage, imageops};
use lopdf::{Document, Object, Stream, dictionary};
use qrcode::{Color, EcLevel, QrCode};
use qrswap_core::types::{Detection, MediaKind, Point, Quad};
use qrswap_core::{OcclusionPolicy, PipelineConfig, QrSwapError};
use qrswap_document::raster::codec::{encode_jpeg, encode_png};
use qrswap_document::{LopdfRasterizer, PdfWriter, QrDecoder, QrEncoder, QrPipeline};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A white raster with a generated code pasted at `(x, y)`.
fn raster_with_code(width: u32, height: u32, text: &str, x: i64, y: i64) -> RgbaImage {
    let code = QrEncoder::new(6, 4).encode(text).unwrap();
    let mut raster = RgbaImage::from_pixel(width, height, WHITE);
    imageops::overlay(&mut raster, &DynamicImage::ImageLuma8(code).to_rgba8(), x, y);
    raster
}

/// An A4 PDF whose only content is a full-page image holding one code.
fn image_pdf(text: &str) -> Vec<u8> {
    PdfWriter::create_from_images(&[raster_with_code(595, 842, text, 100, 100)], 72.0).unwrap()
}

/// Content stream drawing `text` as filled module rectangles whose symbol
/// bottom-left corner sits at `(x, y)` in page points.
fn vector_code(text: &str, x: f64, y: f64, module: f64) -> String {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H).unwrap();
    let n = code.width();
    let mut ops = String::from("0 g\n");
    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color == Color::Dark {
            let (mx, my) = (i % n, i / n);
            ops.push_str(&format!(
                "{} {} {} {} re\n",
                x + mx as f64 * module,
                y + (n - 1 - my) as f64 * module,
                module,
                module
            ));
        }
    }
    ops.push_str("f\n");
    ops
}

/// One-page PDF with the given MediaBox, content and image XObjects.
fn build_pdf(media_box: [f64; 4], content: String, images: Vec<(&str, Stream)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut xobjects = lopdf::Dictionary::new();
    for (name, stream) in images {
        let id = doc.add_object(stream);
        xobjects.set(name, Object::Reference(id));
    }
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box.iter().map(|v| Object::Real(*v as f32)).collect::<Vec<_>>(),
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => xobjects },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn gray_xobject(img: &GrayImage) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => img.width() as i64,
            "Height" => img.height() as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        img.as_raw().clone(),
    )
}

/// Pipeline pinned to the built-in rasterizer, for pixel-exact assertions
/// that must not depend on whether PDFium is installed.
fn builtin(config: PipelineConfig) -> QrPipeline {
    QrPipeline::new(config).with_rasterizer(Box::new(LopdfRasterizer))
}

fn only(detections: &[Detection]) -> &Detection {
    assert_eq!(detections.len(), 1, "expected exactly one detection");
    &detections[0]
}

fn centre(quad: &Quad) -> Point {
    let [a, b, c, d] = quad.corners();
    Point::new((a.x + b.x + c.x + d.x) / 4.0, (a.y + b.y + c.y + d.y) / 4.0)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scan_finds_the_code_on_a_one_page_pdf() {
    let outcome = QrPipeline::default()
        .scan(&image_pdf("hello"), MediaKind::Pdf, 1)
        .unwrap();

    let detection = only(&outcome.detections);
    assert_eq!(detection.payload, "hello");
    assert_eq!(detection.page, Some(1));
    assert_eq!(outcome.page_count, Some(1));
    assert_eq!(outcome.preview.scale, 2.0);
    assert_eq!(outcome.preview.raster.dimensions(), (1190, 1684));
}

#[test]
fn pages_outside_the_document_are_rejected() {
    let pipeline = QrPipeline::default();
    let pdf = image_pdf("hello");
    for page in [0, 2] {
        match pipeline.scan(&pdf, MediaKind::Pdf, page) {
            Err(QrSwapError::PageRange { page_count, .. }) => assert_eq!(page_count, 1),
            other => panic!("expected PageRange for page {page}, got {other:?}"),
        }
    }
    // Scanning never changes the page count.
    assert_eq!(pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap().page_count, Some(1));
}

#[test]
fn replaced_pdf_code_decodes_to_new_text_in_the_same_place() {
    let pipeline = QrPipeline::default();
    let pdf = image_pdf("hello");
    let before = pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap();
    let old = only(&before.detections).clone();

    let replaced = pipeline
        .replace(&pdf, MediaKind::Pdf, &old, "https://example.com", 1)
        .unwrap();
    assert_eq!(replaced.kind, MediaKind::Pdf);
    assert!(replaced.bytes.starts_with(b"%PDF"));

    // The preview raster carries the new code.
    let found = QrDecoder::default().scan(&replaced.preview.raster, Some(1)).unwrap();
    let new = only(&found);
    assert_eq!(new.payload, "https://example.com");

    let (a, b) = (centre(&old.quad), centre(&new.quad));
    assert!(a.distance(&b) < 10.0, "centre moved from {a:?} to {b:?}");
    let ratio = new.quad.width() / old.quad.width();
    assert!((0.8..1.05).contains(&ratio), "size ratio {ratio}");

    // So does the serialized artifact.
    let rescanned = pipeline.scan(&replaced.bytes, MediaKind::Pdf, 1).unwrap();
    assert_eq!(only(&rescanned.detections).payload, "https://example.com");
}

#[test]
fn replacing_twice_with_the_same_text_is_stable() {
    let pipeline = QrPipeline::default();
    let pdf = image_pdf("hello");
    let old = only(&pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap().detections).clone();

    let first = pipeline.replace(&pdf, MediaKind::Pdf, &old, "again", 1).unwrap();
    let again = only(&pipeline.scan(&first.bytes, MediaKind::Pdf, 1).unwrap().detections).clone();
    let second = pipeline
        .replace(&first.bytes, MediaKind::Pdf, &again, "again", 1)
        .unwrap();

    let found = pipeline.scan(&second.bytes, MediaKind::Pdf, 1).unwrap();
    assert_eq!(only(&found.detections).payload, "again");
}

#[test]
fn png_without_codes_scans_empty() {
    let png = encode_png(&RgbaImage::from_fn(200, 150, |x, y| {
        Rgba([(x % 200) as u8, (y % 150) as u8, 90, 255])
    }))
    .unwrap();
    let outcome = QrPipeline::default().scan(&png, MediaKind::Png, 1).unwrap();
    assert!(outcome.detections.is_empty());
    assert_eq!(outcome.page_count, None);
}

#[test]
fn over_capacity_text_fails_with_encoding_error() {
    let pipeline = QrPipeline::default();
    let pdf = image_pdf("hello");
    let old = only(&pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap().detections).clone();

    let text = "A".repeat(1900);
    let err = pipeline.replace(&pdf, MediaKind::Pdf, &old, &text, 1).unwrap_err();
    assert!(matches!(err, QrSwapError::Encoding(_)));
}

#[test]
fn png_replacement_keeps_png_and_decodes() {
    let png = encode_png(&raster_with_code(320, 240, "before", 40, 30)).unwrap();
    let pipeline = QrPipeline::default();
    let old = only(&pipeline.scan(&png, MediaKind::Png, 1).unwrap().detections).clone();
    assert_eq!(old.page, None);

    let replaced = pipeline.replace(&png, MediaKind::Png, &old, "after", 1).unwrap();
    assert_eq!(image::guess_format(&replaced.bytes).unwrap(), ImageFormat::Png);
    let found = pipeline.scan(&replaced.bytes, MediaKind::Png, 1).unwrap();
    assert_eq!(only(&found.detections).payload, "after");
}

#[test]
fn jpeg_replacement_keeps_jpeg_and_decodes() {
    let jpeg = encode_jpeg(&raster_with_code(320, 240, "before", 40, 30), 95).unwrap();
    let pipeline = QrPipeline::default();
    let old = only(&pipeline.scan(&jpeg, MediaKind::Jpeg, 1).unwrap().detections).clone();

    let replaced = pipeline.replace(&jpeg, MediaKind::Jpeg, &old, "after", 1).unwrap();
    assert_eq!(replaced.kind, MediaKind::Jpeg);
    assert_eq!(image::guess_format(&replaced.bytes).unwrap(), ImageFormat::Jpeg);
    let found = pipeline.scan(&replaced.bytes, MediaKind::Jpeg, 1).unwrap();
    assert_eq!(only(&found.detections).payload, "after");
}

#[test]
fn offset_mediabox_matches_zero_origin_page() {
    let zero = build_pdf(
        [0.0, 0.0, 595.0, 842.0],
        vector_code("offset", 100.0, 500.0, 6.0),
        Vec::new(),
    );
    let shifted = build_pdf(
        [50.0, 100.0, 645.0, 942.0],
        vector_code("offset", 150.0, 600.0, 6.0),
        Vec::new(),
    );
    let pipeline = builtin(PipelineConfig::default());

    let a = pipeline.scan(&zero, MediaKind::Pdf, 1).unwrap();
    let b = pipeline.scan(&shifted, MediaKind::Pdf, 1).unwrap();
    let (da, db) = (only(&a.detections).clone(), only(&b.detections).clone());
    assert_eq!(da.payload, "offset");
    assert_eq!(da.quad, db.quad);

    let ra = pipeline.replace(&zero, MediaKind::Pdf, &da, "moved", 1).unwrap();
    let rb = pipeline.replace(&shifted, MediaKind::Pdf, &db, "moved", 1).unwrap();
    assert_eq!(ra.preview.raster, rb.preview.raster);
    let found = QrDecoder::default().scan(&rb.preview.raster, Some(1)).unwrap();
    assert_eq!(only(&found).payload, "moved");
}

/// Distance from `p` to a convex quad, positive when `p` lies outside it.
fn outside_by(quad: &Quad, p: Point) -> f64 {
    let corners = quad.corners();
    let signed_area: f64 = (0..4)
        .map(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    let orientation = signed_area.signum();
    (0..4)
        .map(|i| {
            let (a, b) = (corners[i], corners[(i + 1) % 4]);
            let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
            -orientation * cross / a.distance(&b)
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

#[test]
fn rotated_code_occlusion_follows_the_quadrilateral() {
    // Light blue page with a code rotated by 30 degrees around (300, 420).
    let code = QrEncoder::new(4, 0).encode("tilted").unwrap();
    let side = 180.0;
    let (sin, cos) = 30f64.to_radians().sin_cos();
    let tx = 300.0 - side * (cos - sin) / 2.0;
    let ty = 420.0 - side * (sin + cos) / 2.0;
    let content = format!(
        "0.8 0.9 1 rg 0 0 595 842 re f\nq {} {} {} {} {} {} cm /Code Do Q\n",
        side * cos,
        side * sin,
        -side * sin,
        side * cos,
        tx,
        ty
    );
    let pdf = build_pdf(
        [0.0, 0.0, 595.0, 842.0],
        content,
        vec![("Code", gray_xobject(&code))],
    );

    let mut results = Vec::new();
    for policy in [OcclusionPolicy::Quadrilateral, OcclusionPolicy::BoundingBox] {
        let pipeline = builtin(PipelineConfig {
            occlusion: policy,
            ..PipelineConfig::default()
        });
        let scan = pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap();
        let detection = only(&scan.detections).clone();
        assert_eq!(detection.payload, "tilted");
        let replaced = pipeline
            .replace(&pdf, MediaKind::Pdf, &detection, "level", 1)
            .unwrap();
        results.push((detection, scan.preview.raster, replaced.preview.raster));
    }

    let (detection, before, after_quad) = &results[0];
    let (_, _, after_bbox) = &results[1];
    let quad = detection.quad;
    let bbox = quad.bounding_box();
    let background = *before.get_pixel(1, 1);
    let (left, top) = (quad.top_left.x, quad.top_left.y);
    let (right, bottom) = (left + quad.width(), top + quad.height());

    // A background pixel inside the bounding box but well clear of both the
    // quad and the axis-aligned placement anchored at its top-left corner.
    let sample = (bbox.y as u32..bbox.bottom() as u32)
        .flat_map(|y| (bbox.x as u32..bbox.right() as u32).map(move |x| (x, y)))
        .find(|&(x, y)| {
            let p = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let inside_bbox = p.x > bbox.x + 2.0
                && p.x < bbox.right() - 2.0
                && p.y > bbox.y + 2.0
                && p.y < bbox.bottom() - 2.0;
            let clear_of_placement =
                p.x < left - 6.0 || p.x > right + 6.0 || p.y < top - 6.0 || p.y > bottom + 6.0;
            inside_bbox
                && clear_of_placement
                && outside_by(&quad, p) > 6.0
                && *before.get_pixel(x, y) == background
        })
        .expect("no background pixel between quad, placement and bounding box");

    assert_eq!(*after_quad.get_pixel(sample.0, sample.1), background);
    assert_eq!(*after_bbox.get_pixel(sample.0, sample.1), WHITE);
}

/// A4 page whose code image is drawn from inside a form XObject that scales
/// it by two and carries the image in its own resources.
fn form_wrapped_pdf(text: &str) -> Vec<u8> {
    let code = QrEncoder::new(4, 4).encode(text).unwrap();
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(gray_xobject(&code));
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(120), Object::Integer(120)],
            "Matrix" => vec![
                Object::Integer(2), Object::Integer(0), Object::Integer(0),
                Object::Integer(2), Object::Integer(0), Object::Integer(0),
            ],
            "Resources" => dictionary! { "XObject" => dictionary! { "Qr" => image_id } },
        },
        b"q 100 0 0 100 10 10 cm /Qr Do Q".to_vec(),
    ));
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        b"q 1 0 0 1 150 300 cm /Wrap Do Q".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
        "Contents" => content_id,
        "Resources" => dictionary! { "XObject" => dictionary! { "Wrap" => form_id } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn code_inside_a_form_xobject_is_found_and_replaced() {
    let pdf = form_wrapped_pdf("wrapped");
    for pipeline in [builtin(PipelineConfig::default()), QrPipeline::default()] {
        let scan = pipeline.scan(&pdf, MediaKind::Pdf, 1).unwrap();
        assert!(scan.is_complete());
        let old = only(&scan.detections).clone();
        assert_eq!(old.payload, "wrapped");

        // Form space 10..110 doubled and shifted: page x 170..370, at 2 px/pt.
        let c = centre(&old.quad);
        assert!((c.x - 540.0).abs() < 12.0, "centre {c:?}");

        let replaced = pipeline
            .replace(&pdf, MediaKind::Pdf, &old, "unwrapped", 1)
            .unwrap();
        let found = pipeline.scan(&replaced.bytes, MediaKind::Pdf, 1).unwrap();
        assert_eq!(only(&found.detections).payload, "unwrapped");
    }
}
