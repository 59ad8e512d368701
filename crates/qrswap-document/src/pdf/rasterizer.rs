// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterizers — turn a PDF page into an RGBA raster at a given scale.
//
// `PdfiumRasterizer` renders everything through the PDFium library and is the
// default. `LopdfRasterizer` is the pure-Rust fallback used when PDFium cannot
// be bound: it interprets the painting subset of the content-stream language
// (paths, strokes, image and form XObjects, inline images). Anything it cannot
// draw is counted in `PageRaster::skipped` so callers can tell an empty page
// from an incompletely rendered one.

use std::sync::OnceLock;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream};
use pdfium_render::prelude::*;
use qrswap_core::error::{QrSwapError, Result};
use qrswap_core::types::Point;
use tracing::{debug, info, instrument, warn};

use super::reader::{PdfReader, number};
use crate::geometry::PageBox;
use crate::raster::fill::{FillRule, fill_path};

/// Largest raster edge a page may be rendered at. Embedded images larger
/// than this are not decoded either.
pub const MAX_RASTER_EDGE: u32 = 16_384;

/// Deepest nesting of form XObjects the fallback follows.
const MAX_FORM_DEPTH: usize = 12;

/// Line segments used to flatten one Bézier curve.
const CURVE_STEPS: usize = 16;

/// A rendered page and how much of its content could not be drawn.
#[derive(Debug, Clone)]
pub struct PageRaster {
    pub image: RgbaImage,
    /// Painting operations that were dropped: undecodable images, shadings,
    /// pattern fills, malformed operators. Zero for a complete render.
    pub skipped: usize,
}

/// Renders one page of a document.
pub trait PageRasterizer: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn render_page(&self, reader: &PdfReader<'_>, page: u32, scale: f64) -> Result<PageRaster>;
}

/// PDFium when the library can be bound, the built-in rasterizer otherwise.
pub fn default_rasterizer() -> Box<dyn PageRasterizer> {
    match PdfiumRasterizer::new() {
        Ok(pdfium) => Box::new(pdfium),
        Err(_) => Box::new(LopdfRasterizer),
    }
}

/// Raster dimensions for `page_box` at `scale`.
pub fn raster_size(page_box: &PageBox, scale: f64) -> Result<(u32, u32)> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(QrSwapError::Render(format!(
            "render scale must be positive, got {scale}"
        )));
    }
    let width = (page_box.width() * scale).ceil();
    let height = (page_box.height() * scale).ceil();
    let max = MAX_RASTER_EDGE as f64;
    if !(width >= 1.0 && height >= 1.0 && width <= max && height <= max) {
        return Err(QrSwapError::Render(format!(
            "page would render at {width}x{height} px"
        )));
    }
    Ok((width as u32, height as u32))
}

// -- PDFium rasterizer --------------------------------------------------------

static PDFIUM: OnceLock<std::result::Result<Pdfium, String>> = OnceLock::new();

/// Full-fidelity rendering through the PDFium library.
pub struct PdfiumRasterizer {
    pdfium: &'static Pdfium,
}

impl PdfiumRasterizer {
    /// Bind to PDFium next to the executable, in the working directory, or on
    /// the system library path, in that order. The binding is made once per
    /// process and shared.
    pub fn new() -> Result<Self> {
        let bound = PDFIUM.get_or_init(|| match bind_pdfium() {
            Ok(pdfium) => {
                info!("PDFium bound for page rendering");
                Ok(pdfium)
            }
            Err(err) => {
                warn!(%err, "PDFium unavailable, falling back to the built-in rasterizer");
                Err(err)
            }
        });
        match bound {
            Ok(pdfium) => Ok(Self { pdfium }),
            Err(err) => Err(QrSwapError::Render(format!("PDFium unavailable: {err}"))),
        }
    }
}

fn bind_pdfium() -> std::result::Result<Pdfium, String> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(dir) = exe_dir {
        if let Ok(bindings) =
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        {
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|err| err.to_string())
}

impl PageRasterizer for PdfiumRasterizer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    #[instrument(skip(self, reader))]
    fn render_page(&self, reader: &PdfReader<'_>, page: u32, scale: f64) -> Result<PageRaster> {
        let page_box = reader.page_box(page)?;
        let (width, height) = raster_size(&page_box, scale)?;
        let index = u16::try_from(page - 1)
            .map_err(|_| QrSwapError::Render(format!("page {page} is beyond PDFium's range")))?;

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(reader.source_bytes(), None)
            .map_err(|err| QrSwapError::Render(format!("PDFium load failed: {}", err)))?;
        let pdf_page = document
            .pages()
            .get(index)
            .map_err(|err| QrSwapError::Render(format!("PDFium page lookup failed: {}", err)))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|err| QrSwapError::Render(format!("PDFium render failed: {}", err)))?;

        let (got_width, got_height) = (bitmap.width() as u32, bitmap.height() as u32);
        let mut image = RgbaImage::from_raw(got_width, got_height, bitmap.as_rgba_bytes())
            .ok_or_else(|| QrSwapError::Render("PDFium bitmap has unexpected size".into()))?;
        if (got_width, got_height) != (width, height) {
            debug!(got_width, got_height, width, height, "Resizing PDFium bitmap");
            image = imageops::resize(&image, width, height, FilterType::Triangle);
        }

        debug!(width, height, "Page rendered with PDFium");
        Ok(PageRaster { image, skipped: 0 })
    }
}

// -- Affine matrices ----------------------------------------------------------

/// PDF affine matrix `[a b c d e f]`, mapping (x, y) to
/// (a·x + c·y + e, b·x + d·y + f).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Page space to raster pixels: scale, shift by the MediaBox origin, flip y.
    fn device(page_box: &PageBox, scale: f64) -> Self {
        Matrix {
            a: scale,
            b: 0.0,
            c: 0.0,
            d: -scale,
            e: -page_box.x0 * scale,
            f: page_box.y1 * scale,
        }
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values = numbers(operands)?;
        let [a, b, c, d, e, f] = values.as_slice() else {
            return None;
        };
        Some(Matrix {
            a: *a,
            b: *b,
            c: *c,
            d: *d,
            e: *e,
            f: *f,
        })
    }

    /// `self` applied first, then `next`.
    fn then(&self, next: &Matrix) -> Matrix {
        Matrix {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            e: self.e * next.a + self.f * next.c + next.e,
            f: self.e * next.b + self.f * next.d + next.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> Point {
        Point::new(
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    fn invert(&self) -> Option<Matrix> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        Some(Matrix {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }
}

// -- Built-in rasterizer ------------------------------------------------------

/// Pure-Rust rasterizer over `lopdf` content streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfRasterizer;

impl PageRasterizer for LopdfRasterizer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    #[instrument(skip(self, reader))]
    fn render_page(&self, reader: &PdfReader<'_>, page: u32, scale: f64) -> Result<PageRaster> {
        let page_box = reader.page_box(page)?;
        let (width, height) = raster_size(&page_box, scale)?;
        let resources = reader.page_resources(page)?;
        let operations = reader.page_operations(page)?;

        let mut painter = Painter {
            reader,
            canvas: RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
            state: GraphicsState {
                ctm: Matrix::device(&page_box, scale),
                ..GraphicsState::default()
            },
            stack: Vec::new(),
            path: Vec::new(),
            skipped: 0,
        };
        painter.run(&operations, &resources, 0);

        debug!(
            width,
            height,
            operations = operations.len(),
            skipped = painter.skipped,
            "Page rasterized"
        );
        Ok(PageRaster {
            image: painter.canvas,
            skipped: painter.skipped,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    ctm: Matrix,
    fill: Rgba<u8>,
    stroke: Rgba<u8>,
    /// In user space.
    line_width: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: Rgba([0, 0, 0, 255]),
            stroke: Rgba([0, 0, 0, 255]),
            line_width: 1.0,
        }
    }
}

/// One subpath in user space.
#[derive(Debug, Clone, Default)]
struct Subpath {
    points: Vec<Point>,
    closed: bool,
}

struct Painter<'r> {
    reader: &'r PdfReader<'r>,
    canvas: RgbaImage,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    path: Vec<Subpath>,
    skipped: usize,
}

impl Painter<'_> {
    fn run(&mut self, operations: &[Operation], resources: &Dictionary, depth: usize) {
        for op in operations {
            self.execute(op, resources, depth);
        }
    }

    fn execute(&mut self, op: &Operation, resources: &Dictionary, depth: usize) {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => self.stack.push(self.state),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => match Matrix::from_operands(operands) {
                Some(m) => self.state.ctm = m.then(&self.state.ctm),
                None => self.skip(op),
            },
            "w" => match numbers(operands).as_deref() {
                Some([width]) => self.state.line_width = width.abs(),
                _ => self.skip(op),
            },

            "g" | "rg" | "k" | "sc" | "scn" => match numbers(operands).and_then(|v| color(&v)) {
                Some(fill) => self.state.fill = fill,
                None => self.skip(op),
            },
            "G" | "RG" | "K" | "SC" | "SCN" => match numbers(operands).and_then(|v| color(&v)) {
                Some(stroke) => self.state.stroke = stroke,
                None => self.skip(op),
            },

            "m" => match point_operands(operands) {
                Some(p) => self.path.push(Subpath {
                    points: vec![p],
                    closed: false,
                }),
                None => self.skip(op),
            },
            "l" => match point_operands(operands) {
                Some(p) => self.line_to(p),
                None => self.skip(op),
            },
            "c" | "v" | "y" => {
                if !self.curve_to(op.operator.as_str(), operands) {
                    self.skip(op);
                }
            }
            "re" => match numbers(operands).as_deref() {
                Some([x, y, w, h]) => self.path.push(Subpath {
                    points: vec![
                        Point::new(*x, *y),
                        Point::new(x + w, *y),
                        Point::new(x + w, y + h),
                        Point::new(*x, y + h),
                    ],
                    closed: true,
                }),
                _ => self.skip(op),
            },
            "h" => {
                if let Some(subpath) = self.path.last_mut() {
                    subpath.closed = true;
                }
            }

            "f" | "F" => self.paint(Some(FillRule::NonZero), false),
            "f*" => self.paint(Some(FillRule::EvenOdd), false),
            "B" => self.paint(Some(FillRule::NonZero), true),
            "B*" => self.paint(Some(FillRule::EvenOdd), true),
            "b" => {
                self.close_last();
                self.paint(Some(FillRule::NonZero), true);
            }
            "b*" => {
                self.close_last();
                self.paint(Some(FillRule::EvenOdd), true);
            }
            "S" => self.paint(None, true),
            "s" => {
                self.close_last();
                self.paint(None, true);
            }
            "n" => self.path.clear(),

            "Do" => match operands.first() {
                Some(Object::Name(name)) => self.draw_xobject(name, resources, depth),
                _ => self.skip(op),
            },
            "BI" => match operands.first() {
                Some(Object::Stream(inline)) => self.draw_inline_image(inline, resources),
                _ => self.skip(op),
            },
            "sh" => self.skip(op),

            // Text, clipping, marked content and rendering hints never carry
            // the raster content a QR code is drawn with.
            _ => {}
        }
    }

    fn skip(&mut self, op: &Operation) {
        debug!(operator = %op.operator, "Skipping operation");
        self.skipped += 1;
    }

    fn current_point(&self) -> Option<Point> {
        self.path.last().and_then(|s| s.points.last().copied())
    }

    fn line_to(&mut self, p: Point) {
        match self.path.last_mut() {
            Some(subpath) => subpath.points.push(p),
            None => self.path.push(Subpath {
                points: vec![p],
                closed: false,
            }),
        }
    }

    fn close_last(&mut self) {
        if let Some(subpath) = self.path.last_mut() {
            subpath.closed = true;
        }
    }

    /// Flatten a cubic Bézier (`c`, `v` or `y`) into the current subpath.
    fn curve_to(&mut self, operator: &str, operands: &[Object]) -> bool {
        let Some(start) = self.current_point() else {
            return false;
        };
        let Some(values) = numbers(operands) else {
            return false;
        };
        let (c1, c2, end) = match (operator, values.as_slice()) {
            ("c", [x1, y1, x2, y2, x3, y3]) => (
                Point::new(*x1, *y1),
                Point::new(*x2, *y2),
                Point::new(*x3, *y3),
            ),
            ("v", [x2, y2, x3, y3]) => (start, Point::new(*x2, *y2), Point::new(*x3, *y3)),
            ("y", [x1, y1, x3, y3]) => (
                Point::new(*x1, *y1),
                Point::new(*x3, *y3),
                Point::new(*x3, *y3),
            ),
            _ => return false,
        };
        for step in 1..=CURVE_STEPS {
            let t = step as f64 / CURVE_STEPS as f64;
            let u = 1.0 - t;
            let (w0, w1, w2, w3) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
            self.line_to(Point::new(
                w0 * start.x + w1 * c1.x + w2 * c2.x + w3 * end.x,
                w0 * start.y + w1 * c1.y + w2 * c2.y + w3 * end.y,
            ));
        }
        true
    }

    /// Fill and/or stroke the current path, then clear it.
    fn paint(&mut self, fill: Option<FillRule>, stroke: bool) {
        let path = std::mem::take(&mut self.path);
        let ctm = self.state.ctm;

        if let Some(rule) = fill {
            let rings: Vec<Vec<Point>> = path
                .iter()
                .map(|s| s.points.iter().map(|p| ctm.apply(p.x, p.y)).collect())
                .collect();
            fill_path(&mut self.canvas, &rings, rule, self.state.fill);
        }
        if stroke {
            self.stroke_path(&path);
        }
    }

    /// Stroke with butt caps: each segment becomes a filled quadrilateral.
    fn stroke_path(&mut self, path: &[Subpath]) {
        let ctm = self.state.ctm;
        // A zero-width line is one device pixel wide.
        let half = match self.state.line_width {
            w if w > 0.0 => w / 2.0,
            _ => 0.5 / ctm.determinant().abs().sqrt().max(1e-9),
        };

        for subpath in path {
            let points = &subpath.points;
            let mut segments: Vec<(Point, Point)> =
                points.windows(2).map(|pair| (pair[0], pair[1])).collect();
            if subpath.closed && points.len() > 2 {
                if let (Some(last), Some(first)) = (points.last(), points.first()) {
                    segments.push((*last, *first));
                }
            }
            for (a, b) in segments {
                let length = a.distance(&b);
                if length < 1e-9 {
                    continue;
                }
                let nx = -(b.y - a.y) / length * half;
                let ny = (b.x - a.x) / length * half;
                let quad = vec![
                    ctm.apply(a.x + nx, a.y + ny),
                    ctm.apply(b.x + nx, b.y + ny),
                    ctm.apply(b.x - nx, b.y - ny),
                    ctm.apply(a.x - nx, a.y - ny),
                ];
                fill_path(&mut self.canvas, &[quad], FillRule::NonZero, self.state.stroke);
            }
        }
    }

    fn draw_xobject(&mut self, name: &[u8], resources: &Dictionary, depth: usize) {
        let reader = self.reader;
        let stream = match reader
            .lookup(resources, b"XObject")
            .and_then(|xobjects| match xobjects {
                Object::Dictionary(dict) => reader.lookup(dict, name),
                _ => None,
            }) {
            Some(Object::Stream(stream)) => stream,
            _ => {
                debug!(name = %String::from_utf8_lossy(name), "XObject not found");
                self.skipped += 1;
                return;
            }
        };

        match reader.lookup(&stream.dict, b"Subtype") {
            Some(subtype) if is_name(subtype, b"Image") => {
                match decode_image(reader, stream, resources, self.state.fill) {
                    Some(image) => self.paint_image(&image),
                    None => self.skipped += 1,
                }
            }
            Some(subtype) if is_name(subtype, b"Form") => self.draw_form(stream, resources, depth),
            _ => {
                debug!(name = %String::from_utf8_lossy(name), "Skipping unsupported XObject");
                self.skipped += 1;
            }
        }
    }

    /// Run a form XObject's content under its `/Matrix`, with its own
    /// `/Resources` when it has them.
    fn draw_form(&mut self, form: &Stream, parent_resources: &Dictionary, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            debug!(depth, "Form XObjects nested too deeply");
            self.skipped += 1;
            return;
        }
        let reader = self.reader;
        let operations = match form
            .get_plain_content()
            .map_err(|err| err.to_string())
            .and_then(|bytes| Content::decode(&bytes).map_err(|err| err.to_string()))
        {
            Ok(content) => content.operations,
            Err(err) => {
                debug!(%err, "Form XObject content is unreadable");
                self.skipped += 1;
                return;
            }
        };
        let matrix = match reader.lookup(&form.dict, b"Matrix") {
            Some(Object::Array(items)) => Matrix::from_operands(items).unwrap_or(Matrix::IDENTITY),
            _ => Matrix::IDENTITY,
        };
        let resources = match reader.lookup(&form.dict, b"Resources") {
            Some(Object::Dictionary(dict)) => dict,
            _ => parent_resources,
        };

        let saved_state = self.state;
        let saved_depth = self.stack.len();
        let saved_path = std::mem::take(&mut self.path);
        self.state.ctm = matrix.then(&self.state.ctm);

        self.run(&operations, resources, depth + 1);

        self.state = saved_state;
        self.stack.truncate(saved_depth);
        self.path = saved_path;
    }

    fn draw_inline_image(&mut self, inline: &Stream, resources: &Dictionary) {
        let expanded = Stream::new(expand_inline_keys(&inline.dict), inline.content.clone());
        match decode_image(self.reader, &expanded, resources, self.state.fill) {
            Some(image) => self.paint_image(&image),
            None => self.skipped += 1,
        }
    }

    /// Paint `image` into the unit square mapped by the current CTM,
    /// sampling nearest-neighbour through the inverse transform.
    fn paint_image(&mut self, image: &RgbaImage) {
        let ctm = self.state.ctm;
        let Some(inverse) = ctm.invert() else {
            debug!("Image CTM is singular");
            return;
        };

        let corners = [
            ctm.apply(0.0, 0.0),
            ctm.apply(1.0, 0.0),
            ctm.apply(1.0, 1.0),
            ctm.apply(0.0, 1.0),
        ];
        let (cw, ch) = self.canvas.dimensions();
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let x0 = min_x.floor().clamp(0.0, cw as f64) as u32;
        let x1 = max_x.ceil().clamp(0.0, cw as f64) as u32;
        let y0 = min_y.floor().clamp(0.0, ch as f64) as u32;
        let y1 = max_y.ceil().clamp(0.0, ch as f64) as u32;

        let (iw, ih) = image.dimensions();
        for py in y0..y1 {
            for px in x0..x1 {
                let uv = inverse.apply(px as f64 + 0.5, py as f64 + 0.5);
                if !(0.0..1.0).contains(&uv.x) || !(0.0..1.0).contains(&uv.y) {
                    continue;
                }
                // Image row 0 is the top edge, at v = 1.
                let col = ((uv.x * iw as f64) as u32).min(iw - 1);
                let row = (((1.0 - uv.y) * ih as f64) as u32).min(ih - 1);
                let src = *image.get_pixel(col, row);
                match src.0[3] {
                    0 => {}
                    255 => self.canvas.put_pixel(px, py, src),
                    alpha => {
                        let dst = self.canvas.get_pixel_mut(px, py);
                        blend(dst, src, alpha);
                    }
                }
            }
        }
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, alpha: u8) {
    let a = alpha as u32;
    for c in 0..3 {
        dst.0[c] = ((src.0[c] as u32 * a + dst.0[c] as u32 * (255 - a) + 127) / 255) as u8;
    }
    dst.0[3] = 255;
}

fn is_name(object: &Object, expected: &[u8]) -> bool {
    matches!(object, Object::Name(name) if name.as_slice() == expected)
}

fn numbers(operands: &[Object]) -> Option<Vec<f64>> {
    operands.iter().map(number).collect()
}

fn point_operands(operands: &[Object]) -> Option<Point> {
    match numbers(operands)?.as_slice() {
        [x, y] => Some(Point::new(*x, *y)),
        _ => None,
    }
}

/// Colour from gray, RGB or CMYK components in `[0, 1]`.
fn color(components: &[f64]) -> Option<Rgba<u8>> {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    match components {
        [g] => Some(Rgba([channel(*g), channel(*g), channel(*g), 255])),
        [r, g, b] => Some(Rgba([channel(*r), channel(*g), channel(*b), 255])),
        [c, m, y, k] => {
            let ink = |v: f64| (1.0 - v.clamp(0.0, 1.0)) * (1.0 - k.clamp(0.0, 1.0));
            Some(Rgba([channel(ink(*c)), channel(ink(*m)), channel(ink(*y)), 255]))
        }
        _ => None,
    }
}

// -- Images -------------------------------------------------------------------

/// How image samples become colours.
#[derive(Debug, Clone, PartialEq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// One tint component; 1.0 is full ink.
    Separation,
    Indexed {
        base: Box<ColorModel>,
        hival: u32,
        palette: Vec<u8>,
    },
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            ColorModel::Gray | ColorModel::Separation | ColorModel::Indexed { .. } => 1,
            ColorModel::Rgb => 3,
            ColorModel::Cmyk => 4,
        }
    }

    fn default_decode(&self, bits: u32) -> Vec<(f64, f64)> {
        match self {
            ColorModel::Indexed { .. } => vec![(0.0, ((1u64 << bits) - 1) as f64)],
            other => vec![(0.0, 1.0); other.components()],
        }
    }

    fn to_rgba(&self, values: &[f64]) -> Rgba<u8> {
        const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
        match self {
            ColorModel::Separation => color(&[1.0 - values[0]]).unwrap_or(WHITE),
            ColorModel::Indexed {
                base,
                hival,
                palette,
            } => {
                let n = base.components();
                let index = values[0].round().clamp(0.0, *hival as f64) as usize;
                match palette.get(index * n..index * n + n) {
                    Some(entry) => {
                        let components: Vec<f64> =
                            entry.iter().map(|v| *v as f64 / 255.0).collect();
                        base.to_rgba(&components)
                    }
                    None => WHITE,
                }
            }
            _ => color(values).unwrap_or(WHITE),
        }
    }
}

/// Resolve an image colour space, following named entries in the
/// resources' `/ColorSpace` dictionary.
fn color_model(
    reader: &PdfReader<'_>,
    space: &Object,
    resources: &Dictionary,
    depth: usize,
) -> Option<ColorModel> {
    if depth > 4 {
        return None;
    }
    match reader.resolve(space) {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorModel::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorModel::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorModel::Cmyk),
            other => {
                let named = reader
                    .lookup(resources, b"ColorSpace")
                    .and_then(|spaces| match spaces {
                        Object::Dictionary(dict) => reader.lookup(dict, other),
                        _ => None,
                    })?;
                color_model(reader, named, resources, depth + 1)
            }
        },
        Object::Array(items) => {
            let family = match items.first().map(|item| reader.resolve(item)) {
                Some(Object::Name(name)) => name.as_slice(),
                _ => return None,
            };
            match (family, items.as_slice()) {
                (b"CalGray", _) => Some(ColorModel::Gray),
                (b"CalRGB", _) => Some(ColorModel::Rgb),
                (b"ICCBased", [_, profile]) => match reader.resolve(profile) {
                    Object::Stream(icc) => match reader.lookup(&icc.dict, b"N").and_then(number) {
                        Some(n) if n == 1.0 => Some(ColorModel::Gray),
                        Some(n) if n == 3.0 => Some(ColorModel::Rgb),
                        Some(n) if n == 4.0 => Some(ColorModel::Cmyk),
                        _ => None,
                    },
                    _ => None,
                },
                (b"Separation", _) => Some(ColorModel::Separation),
                (b"Indexed" | b"I", [_, base, hival, lookup]) => {
                    let base = color_model(reader, base, resources, depth + 1)?;
                    if matches!(base, ColorModel::Indexed { .. }) {
                        return None;
                    }
                    let hival = number(reader.resolve(hival))?;
                    if !(0.0..=255.0).contains(&hival) {
                        return None;
                    }
                    let palette = match reader.resolve(lookup) {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(stream) => stream.get_plain_content().ok()?,
                        _ => return None,
                    };
                    Some(ColorModel::Indexed {
                        base: Box::new(base),
                        hival: hival as u32,
                        palette,
                    })
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Inline images abbreviate their dictionary keys.
fn expand_inline_keys(dict: &Dictionary) -> Dictionary {
    let mut expanded = Dictionary::new();
    for (key, value) in dict.iter() {
        let key: &[u8] = match key.as_slice() {
            b"W" => b"Width",
            b"H" => b"Height",
            b"BPC" => b"BitsPerComponent",
            b"CS" => b"ColorSpace",
            b"IM" => b"ImageMask",
            b"D" => b"Decode",
            b"F" => b"Filter",
            b"DP" => b"DecodeParms",
            b"I" => b"Interpolate",
            other => other,
        };
        expanded.set(key.to_vec(), value.clone());
    }
    expanded
}

/// Image width or height, rejected unless it is within `1..=MAX_RASTER_EDGE`.
fn dimension(object: Option<&Object>) -> Option<u32> {
    let value = object.and_then(number)?;
    if value.is_finite() && value >= 1.0 && value <= MAX_RASTER_EDGE as f64 {
        Some(value as u32)
    } else {
        debug!(value, "Image dimension out of range");
        None
    }
}

/// Decode an image XObject (or expanded inline image) to RGBA. Stencil masks
/// paint `fill` where their samples are 0; soft masks become alpha.
fn decode_image(
    reader: &PdfReader<'_>,
    stream: &Stream,
    resources: &Dictionary,
    fill: Rgba<u8>,
) -> Option<RgbaImage> {
    let mut image = decode_samples(reader, stream, resources, fill)?;

    if let Some(Object::Stream(smask)) = reader.lookup(&stream.dict, b"SMask") {
        match decode_samples(reader, smask, resources, fill) {
            Some(mask) => {
                let mask = if mask.dimensions() == image.dimensions() {
                    mask
                } else {
                    imageops::resize(&mask, image.width(), image.height(), FilterType::Nearest)
                };
                for (pixel, m) in image.pixels_mut().zip(mask.pixels()) {
                    pixel.0[3] = ((pixel.0[3] as u32 * m.0[0] as u32 + 127) / 255) as u8;
                }
            }
            None => debug!("Soft mask could not be decoded, painting unmasked"),
        }
    }
    Some(image)
}

fn decode_samples(
    reader: &PdfReader<'_>,
    stream: &Stream,
    resources: &Dictionary,
    fill: Rgba<u8>,
) -> Option<RgbaImage> {
    let dict = &stream.dict;
    let width = dimension(reader.lookup(dict, b"Width"))?;
    let height = dimension(reader.lookup(dict, b"Height"))?;

    let filters: Vec<&[u8]> = match reader.lookup(dict, b"Filter") {
        None => Vec::new(),
        Some(Object::Name(name)) => vec![name.as_slice()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match reader.resolve(item) {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            })
            .collect(),
        Some(_) => return None,
    };

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [b"DCTDecode"] => {
            return match image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg) {
                Ok(img) => Some(img.to_rgba8()),
                Err(err) => {
                    debug!(%err, "JPEG image stream failed to decode");
                    None
                }
            };
        }
        chain if chain.iter().all(|f| matches!(*f, b"FlateDecode" | b"LZWDecode" | b"ASCII85Decode")) => {
            match stream.decompressed_content() {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(%err, "Image stream failed to decompress");
                    return None;
                }
            }
        }
        other => {
            debug!(filters = other.len(), "Unsupported image filter chain");
            return None;
        }
    };

    let decode: Option<Vec<f64>> = match reader.lookup(dict, b"Decode") {
        Some(Object::Array(items)) => items.iter().map(|v| number(reader.resolve(v))).collect(),
        _ => None,
    };

    if matches!(reader.lookup(dict, b"ImageMask"), Some(Object::Boolean(true))) {
        let inverted = matches!(decode.as_deref(), Some([lo, _]) if *lo == 1.0);
        let grid = Samples::new(&samples, width, height, 1, 1)?;
        return Some(RgbaImage::from_fn(width, height, |x, y| {
            let painted = (grid.get(x, y, 0) == 0) != inverted;
            if painted { fill } else { Rgba([0, 0, 0, 0]) }
        }));
    }

    let model = match reader.lookup(dict, b"ColorSpace") {
        None => ColorModel::Gray,
        Some(space) => match color_model(reader, space, resources, 0) {
            Some(model) => model,
            None => {
                debug!("Unsupported image colour space");
                return None;
            }
        },
    };
    let bits = reader
        .lookup(dict, b"BitsPerComponent")
        .and_then(number)
        .unwrap_or(8.0) as u32;
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        debug!(bits, "Unsupported bits per component");
        return None;
    }
    let ranges = match decode {
        Some(values) if values.len() == 2 * model.components() => {
            values.chunks(2).map(|pair| (pair[0], pair[1])).collect()
        }
        _ => model.default_decode(bits),
    };
    unpack_samples(&samples, width, height, &model, bits, &ranges)
}

/// Packed sample rows, as laid out in an image stream.
struct Samples<'a> {
    data: &'a [u8],
    row_len: usize,
    bits: u32,
    components: usize,
}

impl<'a> Samples<'a> {
    fn new(data: &'a [u8], width: u32, height: u32, bits: u32, components: usize) -> Option<Self> {
        if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
            debug!(bits, "Unsupported bits per component");
            return None;
        }
        let row_bits = (width as usize)
            .checked_mul(components)?
            .checked_mul(bits as usize)?;
        let row_len = row_bits.div_ceil(8);
        let needed = row_len.checked_mul(height as usize)?;
        if data.len() < needed {
            debug!(have = data.len(), need = needed, "Image stream is truncated");
            return None;
        }
        Some(Self {
            data,
            row_len,
            bits,
            components,
        })
    }

    /// Raw value of component `c` of pixel (x, y).
    fn get(&self, x: u32, y: u32, c: usize) -> u32 {
        let row = &self.data[y as usize * self.row_len..];
        let bit = (x as usize * self.components + c) * self.bits as usize;
        let byte = bit / 8;
        match self.bits {
            16 => u16::from_be_bytes([row[byte], row[byte + 1]]) as u32,
            8 => row[byte] as u32,
            b => {
                let shift = 8 - b as usize - bit % 8;
                (row[byte] >> shift) as u32 & ((1u32 << b) - 1)
            }
        }
    }
}

fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    model: &ColorModel,
    bits: u32,
    decode: &[(f64, f64)],
) -> Option<RgbaImage> {
    let n = model.components();
    if decode.len() != n {
        return None;
    }
    let grid = Samples::new(data, width, height, bits, n)?;
    let max = ((1u64 << bits) - 1) as f64;

    Some(RgbaImage::from_fn(width, height, |x, y| {
        let mut values = [0.0; 4];
        for (c, (lo, hi)) in decode.iter().enumerate() {
            values[c] = lo + grid.get(x, y, c) as f64 * (hi - lo) / max;
        }
        model.to_rgba(&values[..n])
    }))
}
