// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Enhancement pipeline: grayscale, median noise reduction, contrast stretch,
// brightness normalisation, and sharpening.
//
// Every step takes the buffer by value and hands it back, so a step may work
// in place without anyone else observing the intermediate state. All steps are
// total: a zero-area buffer comes back unchanged.

use scanwerk_core::ScanConfig;
use tracing::{debug, info, instrument};

use crate::buffer::PixelBuffer;

/// Luma weights (ITU-R BT.601) scaled by 1000 so rounding stays exact.
const LUMA_R: u32 = 299;
const LUMA_G: u32 = 587;
const LUMA_B: u32 = 114;

/// Convert to grayscale: `round(0.299 R + 0.587 G + 0.114 B)` in all three
/// colour channels. Alpha is untouched.
pub fn to_grayscale(mut buf: PixelBuffer) -> PixelBuffer {
    for px in buf.as_raw_mut().chunks_exact_mut(4) {
        let weighted = LUMA_R * px[0] as u32 + LUMA_G * px[1] as u32 + LUMA_B * px[2] as u32;
        let gray = ((weighted + 500) / 1000) as u8;
        px[0] = gray;
        px[1] = gray;
        px[2] = gray;
    }
    buf
}

/// Median filter over a `kernel` x `kernel` window, per colour channel.
///
/// Windows are clamped at the buffer edges. A kernel of 0 or 1 is a no-op
/// and even kernels are widened to the next odd size.
pub fn reduce_noise(buf: PixelBuffer, kernel: u32) -> PixelBuffer {
    if kernel <= 1 || buf.is_empty() {
        return buf;
    }
    let radius = (kernel / 2) as i64;
    let side = (2 * radius + 1) as usize;
    let mid = side * side / 2;
    let (w, h) = buf.dimensions();

    let mut out = buf.clone();
    let mut window = [Vec::with_capacity(side * side), Vec::with_capacity(side * side), Vec::with_capacity(side * side)];

    for y in 0..h {
        for x in 0..w {
            for channel in window.iter_mut() {
                channel.clear();
            }
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let px = buf.pixel_clamped(x as i64 + dx, y as i64 + dy);
                    for (c, channel) in window.iter_mut().enumerate() {
                        channel.push(px[c]);
                    }
                }
            }
            let alpha = buf.pixel(x, y)[3];
            let mut median = [0u8; 3];
            for (c, channel) in window.iter_mut().enumerate() {
                let (_, m, _) = channel.select_nth_unstable(mid);
                median[c] = *m;
            }
            out.put_pixel(x, y, [median[0], median[1], median[2], alpha]);
        }
    }
    out
}

/// Stretch contrast around mid-gray: `clamp(128 + (v - 128) * factor)`.
pub fn enhance_contrast(mut buf: PixelBuffer, factor: f32) -> PixelBuffer {
    let lut = build_lut(|v| 128.0 + (v - 128.0) * factor);
    apply_lut(&mut buf, &lut);
    buf
}

/// Shift every colour channel so that the mean of the red channel moves to
/// `target`, as far as clamping to [0, 255] allows.
pub fn adjust_brightness(mut buf: PixelBuffer, target: f32) -> PixelBuffer {
    if buf.is_empty() {
        return buf;
    }
    let mean = channel_mean(&buf, 0);
    let offset = target - mean as f32;
    debug!(mean, target, offset, "Brightness offset computed");
    let lut = build_lut(|v| v + offset);
    apply_lut(&mut buf, &lut);
    buf
}

/// 3x3 sharpening: neighbours weigh `-strength`, the centre `1 + 4 * strength`,
/// so the kernel sums to 1 and flat regions keep their brightness.
pub fn sharpen(buf: PixelBuffer, strength: f32) -> PixelBuffer {
    if buf.is_empty() || strength <= 0.0 {
        return buf;
    }
    let (w, h) = buf.dimensions();
    let centre = 1.0 + 4.0 * strength;
    let mut out = buf.clone();

    for y in 0..h {
        for x in 0..w {
            let (xi, yi) = (x as i64, y as i64);
            let c = buf.pixel(x, y);
            let n = buf.pixel_clamped(xi, yi - 1);
            let s = buf.pixel_clamped(xi, yi + 1);
            let e = buf.pixel_clamped(xi + 1, yi);
            let wst = buf.pixel_clamped(xi - 1, yi);
            let mut px = c;
            for ch in 0..3 {
                let neighbours = n[ch] as f32 + s[ch] as f32 + e[ch] as f32 + wst[ch] as f32;
                let v = centre * c[ch] as f32 - strength * neighbours;
                px[ch] = v.round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, px);
        }
    }
    out
}

/// Mean value of one channel.
pub fn channel_mean(buf: &PixelBuffer, channel: usize) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }
    let sum: u64 = buf
        .as_raw()
        .chunks_exact(4)
        .map(|px| px[channel] as u64)
        .sum();
    sum as f64 / buf.pixel_count() as f64
}

fn build_lut(f: impl Fn(f32) -> f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (v, slot) in lut.iter_mut().enumerate() {
        *slot = f(v as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn apply_lut(buf: &mut PixelBuffer, lut: &[u8; 256]) {
    for px in buf.as_raw_mut().chunks_exact_mut(4) {
        px[0] = lut[px[0] as usize];
        px[1] = lut[px[1] as usize];
        px[2] = lut[px[2] as usize];
    }
}

/// Smallest median window used on detection copies.
const DETECTION_NOISE_KERNEL: u32 = 3;

/// The configured chain of enhancement steps applied to a rectified page.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementPipeline {
    pub noise_kernel: u32,
    pub grayscale: bool,
    pub contrast_factor: f32,
    pub brightness_target: f32,
    pub sharpen_strength: f32,
}

impl EnhancementPipeline {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            noise_kernel: config.noise_kernel,
            grayscale: config.grayscale,
            contrast_factor: config.contrast_factor,
            brightness_target: config.brightness_target,
            sharpen_strength: config.sharpen_strength,
        }
    }

    /// Run noise reduction, optional grayscale, contrast, brightness, and
    /// sharpening, in that order.
    #[instrument(skip(self, buf), fields(width = buf.width(), height = buf.height()))]
    pub fn run(&self, buf: PixelBuffer) -> PixelBuffer {
        if buf.is_empty() {
            return buf;
        }
        info!(grayscale = self.grayscale, "Enhancing page");

        let mut buf = reduce_noise(buf, self.noise_kernel);
        if self.grayscale {
            buf = to_grayscale(buf);
        }
        let buf = enhance_contrast(buf, self.contrast_factor);
        let buf = adjust_brightness(buf, self.brightness_target);
        let buf = sharpen(buf, self.sharpen_strength);

        debug!("Enhancement complete");
        buf
    }

    /// Median filter (at least 3 x 3) and contrast stretch for the copy that
    /// boundary detection runs on. Never weakens contrast.
    pub fn prepare_for_detection(&self, buf: PixelBuffer) -> PixelBuffer {
        if buf.is_empty() {
            return buf;
        }
        let buf = reduce_noise(buf, self.noise_kernel.max(DETECTION_NOISE_KERNEL));
        enhance_contrast(buf, self.contrast_factor.max(1.0))
    }
}
