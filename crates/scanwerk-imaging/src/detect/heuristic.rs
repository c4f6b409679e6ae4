// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fast preview heuristic: brightness mask, morphological opening, and the
// largest connected region. Cheap enough for a live camera overlay, but too
// coarse for final output.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{Connectivity, connected_components};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{DetectionConfig, Point, Quad};
use tracing::{debug, instrument};

use crate::buffer::PixelBuffer;
use crate::contour::convex_hull;

/// Minimum centre/border brightness difference for a usable mask.
const MIN_CONTRAST: f64 = 10.0;
/// Opening radius (Chebyshev distance) applied to the mask.
const OPENING_RADIUS: u8 = 2;

/// A boundary estimate for on-screen guidance only.
///
/// Deliberately not convertible into a final-output detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewQuad {
    quad: Quad,
}

impl PreviewQuad {
    /// Corners in the coordinate space of the buffer given to
    /// [`detect_preview`].
    pub fn quad(&self) -> &Quad {
        &self.quad
    }
}

/// Estimate the page outline for a live preview frame.
#[instrument(skip(buf, config), fields(width = buf.width(), height = buf.height()))]
pub fn detect_preview(buf: &PixelBuffer, config: &DetectionConfig) -> Result<PreviewQuad> {
    let quad = locate(buf, config)?;
    Ok(PreviewQuad {
        quad: quad.clamped(buf.width(), buf.height()),
    })
}

pub(crate) fn locate(buf: &PixelBuffer, config: &DetectionConfig) -> Result<Quad> {
    if buf.is_empty() {
        return Err(ScanError::BoundaryNotFound);
    }
    let (small, scale) = buf.fit_within(config.preview_dimension);
    let gray = luma(&small);
    let (w, h) = gray.dimensions();

    let centre = centre_mean(&gray);
    let border = border_mean(&gray);
    debug!(centre, border, "Preview brightness sampled");
    if (centre - border).abs() < MIN_CONTRAST {
        return Err(ScanError::BoundaryNotFound);
    }

    let threshold = (centre + border) / 2.0;
    let page_is_brighter = centre > border;
    let mask = GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y).0[0] as f64;
        if (v > threshold) == page_is_brighter {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    let opened = dilate(&erode(&mask, Norm::LInf, OPENING_RADIUS), Norm::LInf, OPENING_RADIUS);

    let labels = connected_components(&opened, Connectivity::Four, Luma([0u8]));
    let mut sizes: Vec<usize> = Vec::new();
    for px in labels.pixels() {
        let label = px.0[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= sizes.len() {
            sizes.resize(label + 1, 0);
        }
        sizes[label] += 1;
    }
    let Some((largest, &size)) = sizes.iter().enumerate().max_by_key(|(_, size)| **size) else {
        return Err(ScanError::BoundaryNotFound);
    };
    let min_pixels = config.min_area_ratio * (w as f64 * h as f64);
    if size == 0 || (size as f64) < min_pixels {
        return Err(ScanError::BoundaryNotFound);
    }

    let mut region = Vec::new();
    for y in 0..h {
        let mut span: Option<(u32, u32)> = None;
        for x in 0..w {
            if labels.get_pixel(x, y).0[0] as usize == largest {
                span = Some(span.map_or((x, x), |(lo, _)| (lo, x)));
            }
        }
        if let Some((lo, hi)) = span {
            region.push(Point::new(lo as f64, y as f64));
            region.push(Point::new(hi as f64 + 1.0, y as f64 + 1.0));
            region.push(Point::new(lo as f64, y as f64 + 1.0));
            region.push(Point::new(hi as f64 + 1.0, y as f64));
        }
    }
    let hull = convex_hull(&region);
    let quad = extreme_corners(&hull).ok_or(ScanError::BoundaryNotFound)?;
    debug!(pixels = size, hull = hull.len(), "Preview region found");

    Ok(quad.scaled(1.0 / scale))
}

/// Four extreme hull points (min/max of `x + y` and of `x - y`) in canonical
/// corner order.
fn extreme_corners(hull: &[Point]) -> Option<Quad> {
    let by = |f: fn(&Point) -> f64| {
        let min = hull.iter().min_by(|a, b| f(a).total_cmp(&f(b))).copied();
        let max = hull.iter().max_by(|a, b| f(a).total_cmp(&f(b))).copied();
        min.zip(max)
    };
    let (min_sum, max_sum) = by(|p| p.x + p.y)?;
    let (min_diff, max_diff) = by(|p| p.x - p.y)?;
    let quad = Quad::from_unordered([min_sum, max_sum, min_diff, max_diff]);
    (quad.area() > 0.0).then_some(quad)
}

fn luma(buf: &PixelBuffer) -> GrayImage {
    GrayImage::from_fn(buf.width(), buf.height(), |x, y| {
        let [r, g, b, _] = buf.pixel(x, y);
        let v = (299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000;
        Luma([v as u8])
    })
}

/// Mean over the central third of the frame.
fn centre_mean(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let (x0, x1) = (w / 3, (2 * w / 3).max(w / 3 + 1));
    let (y0, y1) = (h / 3, (2 * h / 3).max(h / 3 + 1));
    mean_where(gray, |x, y| x >= x0 && x < x1 && y >= y0 && y < y1)
}

/// Mean over a strip one tenth of the short side wide along every edge.
fn border_mean(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let strip = (w.min(h) / 10).max(1);
    mean_where(gray, |x, y| x < strip || y < strip || x + strip >= w || y + strip >= h)
}

fn mean_where(gray: &GrayImage, include: impl Fn(u32, u32) -> bool) -> f64 {
    let (mut sum, mut count) = (0u64, 0u64);
    for (x, y, px) in gray.enumerate_pixels() {
        if include(x, y) {
            sum += px.0[0] as u64;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::WHITE;

    #[test]
    fn preview_outlines_bright_page() {
        let mut buf = PixelBuffer::from_pixel(400, 500, [20, 20, 20, 255]);
        for y in 100..400 {
            for x in 80..320 {
                buf.put_pixel(x, y, WHITE);
            }
        }
        let preview = detect_preview(&buf, &DetectionConfig::default()).expect("preview");
        let q = preview.quad();
        let want = [(80.0, 100.0), (320.0, 100.0), (320.0, 400.0), (80.0, 400.0)];
        for (got, (x, y)) in q.corners().iter().zip(want) {
            assert!(
                (got.x - x).abs() <= 6.0 && (got.y - y).abs() <= 6.0,
                "{:?} vs ({}, {})",
                got,
                x,
                y
            );
        }
    }

    #[test]
    fn preview_handles_dark_page_on_bright_desk() {
        let mut buf = PixelBuffer::from_pixel(300, 300, WHITE);
        for y in 60..240 {
            for x in 60..240 {
                buf.put_pixel(x, y, [30, 30, 30, 255]);
            }
        }
        let q = *detect_preview(&buf, &DetectionConfig::default()).expect("preview").quad();
        assert!((q.area() - 180.0 * 180.0).abs() / (180.0 * 180.0) < 0.1);
    }

    #[test]
    fn flat_frame_has_no_preview() {
        let buf = PixelBuffer::from_pixel(100, 100, [128, 128, 128, 255]);
        assert!(matches!(
            detect_preview(&buf, &DetectionConfig::default()),
            Err(ScanError::BoundaryNotFound)
        ));
    }

    #[test]
    fn extreme_corners_pick_canonical_positions() {
        let hull = vec![
            Point::new(10.0, 20.0),
            Point::new(60.0, 18.0),
            Point::new(110.0, 20.0),
            Point::new(110.0, 80.0),
            Point::new(10.0, 80.0),
        ];
        let quad = extreme_corners(&hull).expect("quad");
        assert_eq!(quad.top_left, Point::new(10.0, 20.0));
        assert_eq!(quad.top_right, Point::new(110.0, 20.0));
        assert_eq!(quad.bottom_right, Point::new(110.0, 80.0));
        assert_eq!(quad.bottom_left, Point::new(10.0, 80.0));
    }

    #[test]
    fn extreme_corners_follow_canonical_ordering() {
        // The largest x - y point has the smaller x of the two side corners.
        let (a, b, c, d) = (
            Point::new(20.0, 0.0),
            Point::new(100.0, 90.0),
            Point::new(40.0, 100.0),
            Point::new(0.0, 10.0),
        );
        let quad = extreme_corners(&[a, b, c, d]).expect("quad");
        assert_eq!(quad, Quad::from_unordered([a, b, c, d]));
        assert_eq!(quad.top_left, d);
        assert_eq!(quad.bottom_right, b);
        assert_eq!(quad.top_right, c);
        assert_eq!(quad.bottom_left, a);
    }

    #[test]
    fn collinear_hull_has_no_corners() {
        let hull = [Point::new(0.0, 0.0), Point::new(10.0, 10.0), Point::new(20.0, 20.0)];
        assert!(extreme_corners(&hull).is_none());
    }
}
