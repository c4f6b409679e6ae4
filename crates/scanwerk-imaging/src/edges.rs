// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canny edge detection on a luminance plane.
//
// Stages: 5x5 Gaussian blur, Sobel gradients, non-maximum suppression with
// four quantised directions, double threshold, and hysteresis. Each stage is a
// pure function so the detectors can reuse intermediate results.

use std::collections::VecDeque;

use tracing::{debug, instrument};

use crate::buffer::PixelBuffer;

/// Pixel value of a strong edge in an [`EdgeMap`].
pub const STRONG: u8 = 255;
/// Pixel value of a weak edge before hysteresis.
pub const WEAK: u8 = 128;

/// Single-channel `f32` image used inside the edge engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayPlane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl GrayPlane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// BT.601 luminance of an RGBA buffer.
    pub fn from_buffer(buf: &PixelBuffer) -> Self {
        let data = buf
            .as_raw()
            .chunks_exact(4)
            .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
            .collect();
        Self {
            width: buf.width() as usize,
            height: buf.height() as usize,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Per-pixel Sobel derivatives and magnitude.
#[derive(Debug, Clone)]
pub struct Gradient {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
    pub magnitude: Vec<f32>,
}

impl Gradient {
    /// Gradient direction at index `i`, radians in (-π, π].
    #[inline]
    pub fn direction(&self, i: usize) -> f32 {
        self.gy[i].atan2(self.gx[i])
    }
}

/// Classified edge pixels: [`STRONG`], [`WEAK`], or 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl EdgeMap {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn is_strong(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == STRONG
    }

    pub fn strong_count(&self) -> usize {
        self.data.iter().filter(|&&v| v == STRONG).count()
    }

    /// Coordinates of every strong pixel, row-major.
    pub fn strong_pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == STRONG)
            .map(move |(i, _)| (i % self.width, i / self.width))
    }
}

/// Thresholds for [`canny`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannyParams {
    /// Strong threshold as a fraction of the maximum suppressed gradient.
    pub high_ratio: f32,
    /// Weak threshold as a fraction of the strong threshold.
    pub low_ratio: f32,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self {
            high_ratio: 0.15,
            low_ratio: 0.4,
        }
    }
}

/// Binomial 5x5 kernel (1 4 6 4 1)/16, applied separably; sums to 1.
const GAUSS_5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// 5x5 Gaussian blur with clamped borders.
pub fn gaussian_blur(plane: &GrayPlane) -> GrayPlane {
    if plane.is_empty() {
        return plane.clone();
    }
    let (w, h) = (plane.width, plane.height);
    let mut horizontal = GrayPlane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in GAUSS_5.iter().enumerate() {
                acc += weight * plane.get_clamped(x as isize + k as isize - 2, y as isize);
            }
            horizontal.data[y * w + x] = acc;
        }
    }
    let mut out = GrayPlane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in GAUSS_5.iter().enumerate() {
                acc += weight * horizontal.get_clamped(x as isize, y as isize + k as isize - 2);
            }
            out.data[y * w + x] = acc;
        }
    }
    out
}

/// Sobel derivatives on interior pixels. The one-pixel frame stays zero.
pub fn sobel(plane: &GrayPlane) -> Gradient {
    let (w, h) = (plane.width, plane.height);
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];
    let mut magnitude = vec![0.0f32; w * h];

    if w >= 3 && h >= 3 {
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let p = |dx: isize, dy: isize| {
                    plane.get((x as isize + dx) as usize, (y as isize + dy) as usize)
                };
                let sx = -p(-1, -1) + p(1, -1) - 2.0 * p(-1, 0) + 2.0 * p(1, 0) - p(-1, 1) + p(1, 1);
                let sy = -p(-1, -1) - 2.0 * p(0, -1) - p(1, -1) + p(-1, 1) + 2.0 * p(0, 1) + p(1, 1);
                let i = y * w + x;
                gx[i] = sx;
                gy[i] = sy;
                magnitude[i] = (sx * sx + sy * sy).sqrt();
            }
        }
    }

    Gradient {
        width: w,
        height: h,
        gx,
        gy,
        magnitude,
    }
}

/// Neighbour offsets across an edge for a gradient direction quantised to
/// 0°, 45°, 90°, or 135° (y axis pointing down).
#[inline]
fn across_edge(direction: f32) -> [(isize, isize); 2] {
    let mut deg = direction.to_degrees();
    if deg < 0.0 {
        deg += 180.0;
    }
    if !(22.5..157.5).contains(&deg) {
        [(-1, 0), (1, 0)]
    } else if deg < 67.5 {
        [(1, 1), (-1, -1)]
    } else if deg < 112.5 {
        [(0, -1), (0, 1)]
    } else {
        [(-1, 1), (1, -1)]
    }
}

/// Keep a pixel only if its magnitude is at least that of both neighbours
/// along the gradient direction. Returns the thinned magnitude.
pub fn non_max_suppression(grad: &Gradient) -> Vec<f32> {
    let (w, h) = (grad.width, grad.height);
    let mut out = vec![0.0f32; w * h];
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let mag = grad.magnitude[i];
            if mag <= 0.0 {
                continue;
            }
            let [(ax, ay), (bx, by)] = across_edge(grad.direction(i));
            let a = grad.magnitude[((y as isize + ay) as usize) * w + (x as isize + ax) as usize];
            let b = grad.magnitude[((y as isize + by) as usize) * w + (x as isize + bx) as usize];
            if mag >= a && mag >= b {
                out[i] = mag;
            }
        }
    }
    out
}

/// Classify thinned magnitudes into strong, weak, and non-edges.
///
/// `high = high_ratio * max(magnitude)` and `low = low_ratio * high`.
pub fn double_threshold(magnitude: &[f32], width: usize, height: usize, params: CannyParams) -> EdgeMap {
    let max = magnitude.iter().copied().fold(0.0f32, f32::max);
    let mut data = vec![0u8; width * height];
    if max > 0.0 {
        let high = params.high_ratio * max;
        let low = params.low_ratio * high;
        debug!(max, high, low, "Canny thresholds");
        for (out, &m) in data.iter_mut().zip(magnitude) {
            *out = if m >= high {
                STRONG
            } else if m >= low && m > 0.0 {
                WEAK
            } else {
                0
            };
        }
    }
    EdgeMap {
        width,
        height,
        data,
    }
}

/// Promote weak pixels 8-connected to strong ones, breadth first, then drop
/// the remaining weak pixels.
pub fn hysteresis(mut map: EdgeMap) -> EdgeMap {
    let (w, h) = (map.width, map.height);
    let mut queue: VecDeque<usize> = map
        .data
        .iter()
        .enumerate()
        .filter(|(_, v)| **v == STRONG)
        .map(|(i, _)| i)
        .collect();

    while let Some(i) = queue.pop_front() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if map.data[j] == WEAK {
                    map.data[j] = STRONG;
                    queue.push_back(j);
                }
            }
        }
    }

    for v in map.data.iter_mut() {
        if *v == WEAK {
            *v = 0;
        }
    }
    map
}

/// Full Canny pipeline over a buffer's luminance.
#[instrument(skip(buf), fields(width = buf.width(), height = buf.height()))]
pub fn canny(buf: &PixelBuffer, params: CannyParams) -> EdgeMap {
    canny_plane(&GrayPlane::from_buffer(buf), params)
}

/// Full Canny pipeline over a prepared luminance plane.
pub fn canny_plane(plane: &GrayPlane, params: CannyParams) -> EdgeMap {
    let blurred = gaussian_blur(plane);
    let grad = sobel(&blurred);
    let thin = non_max_suppression(&grad);
    let classified = double_threshold(&thin, plane.width, plane.height, params);
    let edges = hysteresis(classified);
    debug!(strong = edges.strong_count(), "Canny edges");
    edges
}
