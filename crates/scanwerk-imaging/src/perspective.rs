// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction: homography estimation from four point pairs and an
// inverse-mapped bilinear warp onto an upright rectangle.

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{Point, Quad};
use tracing::{debug, info, instrument};

use crate::buffer::{PixelBuffer, WHITE};

/// Determinants below this are treated as singular.
pub const SINGULAR_EPSILON: f64 = 1e-10;

/// Pivots below this fraction of the largest coefficient end elimination.
const PIVOT_EPSILON: f64 = 1e-12;

/// A 3x3 projective transform, row-major, normalised so `m[8] == 1`
/// whenever that is possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub m: [f64; 9],
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn from_rows(m: [f64; 9]) -> Self {
        Self { m }
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6])
    }

    /// Analytic inverse (adjugate over determinant).
    pub fn inverse(&self) -> Result<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(ScanError::SingularTransform(format!(
                "determinant {:e} is not invertible",
                det
            )));
        }
        let m = &self.m;
        let adj = [
            m[4] * m[8] - m[5] * m[7],
            m[2] * m[7] - m[1] * m[8],
            m[1] * m[5] - m[2] * m[4],
            m[5] * m[6] - m[3] * m[8],
            m[0] * m[8] - m[2] * m[6],
            m[2] * m[3] - m[0] * m[5],
            m[3] * m[7] - m[4] * m[6],
            m[1] * m[6] - m[0] * m[7],
            m[0] * m[4] - m[1] * m[3],
        ];
        let mut inv = adj.map(|v| v / det);
        if inv[8].abs() > SINGULAR_EPSILON {
            let s = inv[8];
            inv = inv.map(|v| v / s);
        }
        Ok(Self { m: inv })
    }

    /// Map a point. `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let m = &self.m;
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if w.abs() < 1e-12 {
            return None;
        }
        Some(Point::new(
            (m[0] * p.x + m[1] * p.y + m[2]) / w,
            (m[3] * p.x + m[4] * p.y + m[5]) / w,
        ))
    }
}

/// Solve for the homography taking each `src` corner onto the matching `dst`
/// corner, with `h33` fixed at 1.
pub fn estimate_homography(src: &Quad, dst: &Quad) -> Result<Homography> {
    let mut a = [[0.0f64; 9]; 8];
    for (i, (s, d)) in src.corners().iter().zip(dst.corners().iter()).enumerate() {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
    }

    let h = solve(&mut a)?;
    let homography = Homography {
        m: [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0],
    };
    if homography.m.iter().any(|v| !v.is_finite()) {
        return Err(ScanError::SingularTransform("non-finite coefficients".into()));
    }
    Ok(homography)
}

/// Gaussian elimination with partial pivoting on an 8x8 augmented system.
fn solve(a: &mut [[f64; 9]; 8]) -> Result<[f64; 8]> {
    let scale = a
        .iter()
        .flat_map(|row| row[..8].iter())
        .fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return Err(ScanError::SingularTransform("empty system".into()));
    }

    for col in 0..8 {
        let pivot_row = (col..8)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        let pivot = a[pivot_row][col];
        if pivot.abs() < PIVOT_EPSILON * scale {
            return Err(ScanError::SingularTransform(format!(
                "negligible pivot {:e} in column {}",
                pivot, col
            )));
        }
        a.swap(col, pivot_row);

        for row in col + 1..8 {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut h = [0.0f64; 8];
    for row in (0..8).rev() {
        let tail: f64 = (row + 1..8).map(|k| a[row][k] * h[k]).sum();
        h[row] = (a[row][8] - tail) / a[row][row];
    }
    Ok(h)
}

/// Inverse-map every output pixel through `h` (source to destination) and
/// sample the source bilinearly. Pixels that fall outside the source are
/// white.
#[instrument(skip(buf, h), fields(src_w = buf.width(), src_h = buf.height()))]
pub fn warp(buf: &PixelBuffer, h: &Homography, out_w: u32, out_h: u32) -> Result<PixelBuffer> {
    let det = h.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
        return Err(ScanError::SingularTransform(format!(
            "determinant {:e} below {:e}",
            det, SINGULAR_EPSILON
        )));
    }
    let inv = h.inverse()?;

    let mut out = PixelBuffer::from_pixel(out_w, out_h, WHITE);
    if buf.is_empty() {
        return Ok(out);
    }
    let (max_x, max_y) = ((buf.width() - 1) as f64, (buf.height() - 1) as f64);

    for y in 0..out_h {
        for x in 0..out_w {
            let Some(src) = inv.apply(Point::new(x as f64, y as f64)) else {
                continue;
            };
            if !(src.x >= 0.0 && src.y >= 0.0 && src.x <= max_x && src.y <= max_y) {
                continue;
            }
            out.put_pixel(x, y, bilinear(buf, src.x, src.y));
        }
    }
    Ok(out)
}

fn bilinear(buf: &PixelBuffer, x: f64, y: f64) -> [u8; 4] {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(buf.width() - 1);
    let y1 = (y0 + 1).min(buf.height() - 1);

    let p00 = buf.pixel(x0, y0);
    let p10 = buf.pixel(x1, y0);
    let p01 = buf.pixel(x0, y1);
    let p11 = buf.pixel(x1, y1);

    let mut px = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        px[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    px
}

/// Warp the region inside `quad` onto an upright rectangle whose sides are
/// the mean lengths of the quad's opposite edges.
#[instrument(skip(buf, quad), fields(width = buf.width(), height = buf.height()))]
pub fn rectify(buf: &PixelBuffer, quad: &Quad) -> Result<PixelBuffer> {
    if !quad.is_finite() {
        return Err(ScanError::SingularTransform("non-finite corners".into()));
    }
    let out_w = quad.mean_width().round() as u32;
    let out_h = quad.mean_height().round() as u32;
    if out_w == 0 || out_h == 0 {
        return Err(ScanError::SingularTransform(format!(
            "degenerate quadrilateral ({}x{})",
            out_w, out_h
        )));
    }

    let dst = Quad::full_frame(out_w, out_h);
    let h = estimate_homography(quad, &dst)?;
    debug!(?h, "Homography estimated");

    let out = warp(buf, &h, out_w, out_h)?;
    info!(out_w, out_h, "Perspective corrected");
    Ok(out)
}
