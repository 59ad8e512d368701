// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Solid fills: rectangles and polygons for the compositor, multi-ring
// paths under a fill rule for the PDF rasterizer.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point as PixelPoint;
use imageproc::rect::Rect as PixelRect;
use qrswap_core::types::{Point, Rect};

/// Fill `rect` on the canvas, snapping edges to the nearest pixel boundary.
///
/// Returns `false` when nothing of the rectangle lands on the canvas.
pub fn fill_rect(canvas: &mut RgbaImage, rect: Rect, color: Rgba<u8>) -> bool {
    let (width, height) = canvas.dimensions();
    let snap = |v: f64, max: u32| -> u32 {
        if v.is_nan() {
            0
        } else {
            v.round().clamp(0.0, max as f64) as u32
        }
    };

    let x0 = snap(rect.x.min(rect.right()), width);
    let x1 = snap(rect.x.max(rect.right()), width);
    let y0 = snap(rect.y.min(rect.bottom()), height);
    let y1 = snap(rect.y.max(rect.bottom()), height);
    if x1 <= x0 || y1 <= y0 {
        return false;
    }

    draw_filled_rect_mut(
        canvas,
        PixelRect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0),
        color,
    );
    true
}

/// Fill an arbitrary simple polygon given in pixel coordinates.
///
/// Axis-aligned rectangles take the exact `fill_rect` path so that adjacent
/// cells (QR modules drawn as separate rectangles) tile without overlap.
pub fn fill_polygon(canvas: &mut RgbaImage, points: &[Point], color: Rgba<u8>) -> bool {
    if let Some(rect) = axis_aligned_rect(points) {
        return fill_rect(canvas, rect, color);
    }

    let mut pixels: Vec<PixelPoint<i32>> = Vec::with_capacity(points.len());
    for p in points {
        if !(p.x.is_finite() && p.y.is_finite()) {
            return false;
        }
        let px = PixelPoint::new(p.x.round() as i32, p.y.round() as i32);
        if pixels.last() != Some(&px) {
            pixels.push(px);
        }
    }
    // draw_polygon_mut rejects an explicitly closed ring.
    while pixels.len() > 1 && pixels.first() == pixels.last() {
        pixels.pop();
    }
    if pixels.len() < 3 {
        return false;
    }

    draw_polygon_mut(canvas, &pixels, color);
    true
}

/// Which points of a multi-ring path count as inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Fill a path made of closed rings under `rule`.
///
/// Pixels are painted when their centre is inside, so paths that share an
/// edge tile without gaps or overlap. Rings with non-finite points are
/// dropped. Returns `false` when nothing was painted.
pub fn fill_path(
    canvas: &mut RgbaImage,
    rings: &[Vec<Point>],
    rule: FillRule,
    color: Rgba<u8>,
) -> bool {
    let edges: Vec<(Point, Point)> = rings
        .iter()
        .filter(|ring| ring.len() >= 2)
        .filter(|ring| ring.iter().all(|p| p.x.is_finite() && p.y.is_finite()))
        .flat_map(|ring| {
            ring.iter()
                .zip(ring.iter().cycle().skip(1))
                .map(|(a, b)| (*a, *b))
        })
        .filter(|(a, b)| a.y != b.y)
        .collect();
    if edges.is_empty() {
        return false;
    }

    let (width, height) = canvas.dimensions();
    let min_y = edges.iter().map(|(a, b)| a.y.min(b.y)).fold(f64::INFINITY, f64::min);
    let max_y = edges.iter().map(|(a, b)| a.y.max(b.y)).fold(f64::NEG_INFINITY, f64::max);
    let first_row = (min_y - 0.5).ceil().clamp(0.0, height as f64) as u32;
    let end_row = (max_y - 0.5).ceil().clamp(0.0, height as f64) as u32;

    let mut painted = false;
    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for row in first_row..end_row {
        let yc = row as f64 + 0.5;
        crossings.clear();
        for (a, b) in &edges {
            if (a.y <= yc) != (b.y <= yc) {
                let t = (yc - a.y) / (b.y - a.y);
                let direction = if b.y > a.y { 1 } else { -1 };
                crossings.push((a.x + t * (b.x - a.x), direction));
            }
        }
        crossings.sort_by(|p, q| p.0.total_cmp(&q.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            let inside = match rule {
                FillRule::NonZero => winding != 0,
                FillRule::EvenOdd => winding % 2 != 0,
            };
            if !inside {
                continue;
            }
            let x0 = (pair[0].0 - 0.5).ceil().clamp(0.0, width as f64) as u32;
            let x1 = (pair[1].0 - 0.5).ceil().clamp(0.0, width as f64) as u32;
            for x in x0..x1 {
                canvas.put_pixel(x, row, color);
                painted = true;
            }
        }
    }
    painted
}

/// Recognise a four-corner polygon whose edges are all horizontal or vertical.
fn axis_aligned_rect(points: &[Point]) -> Option<Rect> {
    const EPS: f64 = 1e-6;
    let ring: Vec<Point> = match points {
        [a, b, c, d, e] if a.distance(e) < EPS => vec![*a, *b, *c, *d],
        [a, b, c, d] => vec![*a, *b, *c, *d],
        _ => return None,
    };

    for i in 0..4 {
        let p = ring[i];
        let q = ring[(i + 1) % 4];
        let horizontal = (p.y - q.y).abs() < EPS;
        let vertical = (p.x - q.x).abs() < EPS;
        if !(horizontal || vertical) {
            return None;
        }
    }

    let min_x = ring.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = ring.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = ring.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = ring.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    Some(Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}
