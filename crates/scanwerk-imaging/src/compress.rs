// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output compression: fit a page into a byte budget, and render thumbnails.

use image::imageops::FilterType;
use scanwerk_core::error::Result;
use tracing::{debug, instrument, warn};

use crate::buffer::PixelBuffer;

/// Lowest JPEG quality the compressor will try, as a fraction.
pub const MIN_QUALITY: f32 = 0.10;
/// Multiplier applied to quality after each over-budget attempt.
const QUALITY_STEP: f32 = 0.85;
/// Multiplier applied to both dimensions once quality is exhausted.
const SHRINK_STEP: f64 = 0.75;
/// Fixed JPEG quality for thumbnails (1-100).
pub const THUMBNAIL_QUALITY: u8 = 60;

/// A JPEG-encoded page.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality used for the final encode, as a fraction.
    pub quality: f32,
    /// Only set when even a 1x1 image at minimum quality is over budget.
    pub budget_exceeded: bool,
}

/// A small JPEG preview.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn jpeg_quality(fraction: f32) -> u8 {
    (fraction * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Encode `buf` as JPEG within `max_bytes`.
///
/// The long edge is first brought down to `max_dimension`. While over budget
/// the quality is lowered step by step to [`MIN_QUALITY`], and after that the
/// dimensions shrink until the budget holds or the image is 1x1.
#[instrument(skip(buf), fields(width = buf.width(), height = buf.height()))]
pub fn compress(buf: &PixelBuffer, max_bytes: usize, max_dimension: u32, quality: f32) -> Result<CompressedImage> {
    let (mut current, scale) = buf.fit_within(max_dimension.max(1));
    if scale < 1.0 {
        debug!(
            width = current.width(),
            height = current.height(),
            "Downscaled to target resolution"
        );
    }
    let mut q = quality.clamp(MIN_QUALITY, 1.0);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let bytes = current.to_jpeg_bytes(jpeg_quality(q))?;
        if bytes.len() <= max_bytes {
            debug!(attempts, size = bytes.len(), quality = q, "Compressed within budget");
            return Ok(CompressedImage {
                width: current.width(),
                height: current.height(),
                bytes,
                quality: q,
                budget_exceeded: false,
            });
        }

        if q > MIN_QUALITY {
            q = (q * QUALITY_STEP).max(MIN_QUALITY);
            continue;
        }

        let (w, h) = current.dimensions();
        if w <= 1 && h <= 1 {
            warn!(size = bytes.len(), max_bytes, "Budget unreachable even at 1x1");
            return Ok(CompressedImage {
                width: w,
                height: h,
                bytes,
                quality: q,
                budget_exceeded: true,
            });
        }
        let nw = ((w as f64 * SHRINK_STEP) as u32).max(1);
        let nh = ((h as f64 * SHRINK_STEP) as u32).max(1);
        current = current.resized(nw, nh, FilterType::Triangle);
    }
}

/// Aspect-preserving JPEG preview no larger than `max_w` x `max_h`. Never
/// upscales.
pub fn thumbnail(buf: &PixelBuffer, max_w: u32, max_h: u32) -> Result<Thumbnail> {
    let (w, h) = buf.dimensions();
    let scale = if w == 0 || h == 0 {
        1.0
    } else {
        (max_w as f64 / w as f64).min(max_h as f64 / h as f64).min(1.0)
    };
    let tw = ((w as f64 * scale).round() as u32).max(1);
    let th = ((h as f64 * scale).round() as u32).max(1);
    let small = buf.resized(tw, th, FilterType::Triangle);
    let bytes = small.to_jpeg_bytes(THUMBNAIL_QUALITY)?;
    Ok(Thumbnail {
        bytes,
        width: small.width(),
        height: small.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic high-entropy content that JPEG cannot squeeze much.
    fn noisy(w: u32, h: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(w, h);
        let mut state = 0x2545_f491_u32;
        for y in 0..h {
            for x in 0..w {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let [r, g, b, _] = state.to_le_bytes();
                buf.put_pixel(x, y, [r, g, b, 255]);
            }
        }
        buf
    }

    #[test]
    fn result_fits_budget() {
        let buf = noisy(300, 200);
        let out = compress(&buf, 20_000, 1000, 0.9).expect("compress");
        assert!(out.bytes.len() <= 20_000);
        assert!(!out.budget_exceeded);
        assert!(out.quality <= 0.9);
    }

    #[test]
    fn long_edge_is_limited() {
        let buf = PixelBuffer::from_pixel(400, 100, [200, 180, 160, 255]);
        let out = compress(&buf, 1_000_000, 200, 0.8).expect("compress");
        assert_eq!((out.width, out.height), (200, 50));
    }

    #[test]
    fn generous_budget_keeps_quality() {
        let buf = PixelBuffer::from_pixel(50, 50, [10, 20, 30, 255]);
        let out = compress(&buf, 1_000_000, 1000, 0.82).expect("compress");
        assert_eq!(out.quality, 0.82);
        assert_eq!((out.width, out.height), (50, 50));
    }

    #[test]
    fn impossible_budget_ends_at_one_pixel() {
        let buf = noisy(64, 64);
        let out = compress(&buf, 10, 1000, 0.9).expect("compress");
        assert!(out.budget_exceeded);
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.quality, MIN_QUALITY);
    }

    #[test]
    fn thumbnail_fits_box_and_keeps_aspect() {
        let buf = PixelBuffer::from_pixel(1000, 500, [90, 90, 90, 255]);
        let thumb = thumbnail(&buf, 240, 320).expect("thumbnail");
        assert_eq!((thumb.width, thumb.height), (240, 120));
        assert!(!thumb.bytes.is_empty());
    }

    #[test]
    fn thumbnail_never_upscales() {
        let buf = PixelBuffer::from_pixel(40, 30, [90, 90, 90, 255]);
        let thumb = thumbnail(&buf, 240, 320).expect("thumbnail");
        assert_eq!((thumb.width, thumb.height), (40, 30));
    }
}
