// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar geometry shared by detection, correction, and page metadata.

use serde::{Deserialize, Serialize};

/// A point in floating-point pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned crop rectangle in integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropArea {
    /// The whole `width` x `height` frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Four document corners in canonical clockwise order.
///
/// Always build a `Quad` with [`Quad::from_unordered`]; detectors return
/// corners in whatever order they found them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl Quad {
    /// Order four arbitrary points.
    ///
    /// The smallest `x + y` is top-left and the largest is bottom-right. Of
    /// the two remaining points the one with the larger `x` is top-right.
    pub fn from_unordered(points: [Point; 4]) -> Self {
        let mut sorted = points;
        sorted.sort_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)));
        let top_left = sorted[0];
        let bottom_right = sorted[3];
        let (top_right, bottom_left) = if sorted[1].x >= sorted[2].x {
            (sorted[1], sorted[2])
        } else {
            (sorted[2], sorted[1])
        };
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// Rectangle covering a whole `width` x `height` image.
    pub fn full_frame(width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            top_left: Point::new(0.0, 0.0),
            top_right: Point::new(w, 0.0),
            bottom_right: Point::new(w, h),
            bottom_left: Point::new(0.0, h),
        }
    }

    /// Corners as `[top_left, top_right, bottom_right, bottom_left]`.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn top_width(&self) -> f64 {
        self.top_left.distance(&self.top_right)
    }

    pub fn bottom_width(&self) -> f64 {
        self.bottom_left.distance(&self.bottom_right)
    }

    pub fn left_height(&self) -> f64 {
        self.top_left.distance(&self.bottom_left)
    }

    pub fn right_height(&self) -> f64 {
        self.top_right.distance(&self.bottom_right)
    }

    /// Mean of the two horizontal edge lengths.
    pub fn mean_width(&self) -> f64 {
        (self.top_width() + self.bottom_width()) / 2.0
    }

    /// Mean of the two vertical edge lengths.
    pub fn mean_height(&self) -> f64 {
        (self.left_height() + self.right_height()) / 2.0
    }

    /// Enclosed area (shoelace formula).
    pub fn area(&self) -> f64 {
        polygon_area(&self.corners())
    }

    pub fn is_finite(&self) -> bool {
        self.corners().iter().all(Point::is_finite)
    }

    /// Multiply every coordinate by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let s = |p: Point| Point::new(p.x * factor, p.y * factor);
        Self {
            top_left: s(self.top_left),
            top_right: s(self.top_right),
            bottom_right: s(self.bottom_right),
            bottom_left: s(self.bottom_left),
        }
    }

    /// Clamp every corner into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let c = |p: Point| Point::new(p.x.clamp(0.0, w), p.y.clamp(0.0, h));
        Self {
            top_left: c(self.top_left),
            top_right: c(self.top_right),
            bottom_right: c(self.bottom_right),
            bottom_left: c(self.bottom_left),
        }
    }

    /// Axis-aligned bounds of the quad, clipped to the image.
    pub fn bounding_box(&self, width: u32, height: u32) -> CropArea {
        let corners = self.corners();
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let x0 = min_x.floor().clamp(0.0, width as f64) as u32;
        let y0 = min_y.floor().clamp(0.0, height as f64) as u32;
        let x1 = max_x.ceil().clamp(0.0, width as f64) as u32;
        let y1 = max_y.ceil().clamp(0.0, height as f64) as u32;

        CropArea {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }
}

/// Area of a simple polygon given its vertices in order (CW or CCW).
pub fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Quad {
        Quad::from_unordered([
            Point::new(10.0, 110.0),
            Point::new(210.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(210.0, 110.0),
        ])
    }

    #[test]
    fn ordering_is_rederived_from_coordinates() {
        let q = rect();
        assert_eq!(q.top_left, Point::new(10.0, 10.0));
        assert_eq!(q.top_right, Point::new(210.0, 10.0));
        assert_eq!(q.bottom_right, Point::new(210.0, 110.0));
        assert_eq!(q.bottom_left, Point::new(10.0, 110.0));
    }

    #[test]
    fn ordering_is_independent_of_input_permutation() {
        let pts = [
            Point::new(52.0, 40.0),
            Point::new(610.0, 75.0),
            Point::new(590.0, 820.0),
            Point::new(30.0, 790.0),
        ];
        let expected = Quad::from_unordered(pts);
        let rotations = [
            [pts[1], pts[2], pts[3], pts[0]],
            [pts[3], pts[1], pts[0], pts[2]],
            [pts[2], pts[0], pts[3], pts[1]],
        ];
        for perm in rotations {
            assert_eq!(Quad::from_unordered(perm), expected);
        }
        assert_eq!(expected.top_right, Point::new(610.0, 75.0));
        assert_eq!(expected.bottom_left, Point::new(30.0, 790.0));
    }

    #[test]
    fn edge_lengths_and_area() {
        let q = rect();
        assert!((q.mean_width() - 200.0).abs() < 1e-9);
        assert!((q.mean_height() - 100.0).abs() < 1e-9);
        assert!((q.area() - 20_000.0).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_is_clipped() {
        let q = Quad::from_unordered([
            Point::new(-5.0, -5.0),
            Point::new(50.0, 0.0),
            Point::new(55.0, 45.0),
            Point::new(0.0, 40.0),
        ]);
        let crop = q.bounding_box(50, 50);
        assert_eq!(crop, CropArea { x: 0, y: 0, width: 50, height: 45 });
    }

    #[test]
    fn degenerate_polygon_has_zero_area() {
        assert_eq!(polygon_area(&[Point::new(0.0, 0.0), Point::new(1.0, 1.0)]), 0.0);
    }
}
