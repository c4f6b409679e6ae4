// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pixel buffer adapter: decode compressed captures into a mutable RGBA
// buffer, and encode buffers back to PNG/JPEG bytes.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use scanwerk_core::SourceImage;
use scanwerk_core::error::{Result, ScanError};
use tracing::{debug, instrument, warn};

/// White, fully opaque.
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// A rectangular RGBA8 buffer (stride `width * 4`).
///
/// Grayscale stages keep `R == G == B` for every pixel rather than switching
/// to a one-channel layout, so every stage accepts every buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    // -- Construction ---------------------------------------------------------

    /// A buffer filled with one colour.
    pub fn from_pixel(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * 4);
        for _ in 0..count {
            data.extend_from_slice(&pixel);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// A fully transparent black buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_pixel(width, height, [0, 0, 0, 0])
    }

    /// Wrap raw RGBA bytes. Fails if the length does not match the
    /// dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ScanError::Decode(format!(
                "raw buffer has {} bytes, expected {} for {}x{} RGBA",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode a compressed capture, honouring its declared MIME type when it
    /// names a known format.
    #[instrument(skip(source), fields(bytes_len = source.bytes.len(), mime = %source.mime_type))]
    pub fn decode(source: &SourceImage) -> Result<Self> {
        let declared = ImageFormat::from_mime_type(&source.mime_type);
        let decoded = match declared {
            Some(format) => image::load_from_memory_with_format(&source.bytes, format).or_else(|err| {
                warn!(%err, ?format, "declared format failed to decode; guessing from content");
                image::load_from_memory(&source.bytes)
            }),
            None => image::load_from_memory(&source.bytes),
        }
        .map_err(|err| ScanError::Decode(err.to_string()))?;

        debug!(
            width = decoded.width(),
            height = decoded.height(),
            "Capture decoded"
        );
        Ok(Self::from_dynamic(decoded))
    }

    /// Convert any decoded image to RGBA8.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self::from_rgba_image(image.to_rgba8())
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Hand the pixels to the `image` crate without copying.
    pub fn into_rgba_image(self) -> RgbaImage {
        let (width, height) = (self.width, self.height);
        // Length always matches the dimensions, so from_raw cannot fail.
        RgbaImage::from_raw(width, height, self.data).unwrap_or_else(|| RgbaImage::new(width, height))
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel at `(x, y)`. Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Pixel at `(x, y)` with coordinates clamped into the buffer.
    #[inline]
    pub fn pixel_clamped(&self, x: i64, y: i64) -> [u8; 4] {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixel(cx, cy)
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&pixel);
    }

    /// Whether every pixel has `R == G == B`.
    pub fn is_grayscale(&self) -> bool {
        self.data
            .chunks_exact(4)
            .all(|px| px[0] == px[1] && px[1] == px[2])
    }

    /// Fraction of pixels that are exactly `pixel`.
    pub fn fraction_matching(&self, pixel: [u8; 4]) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let hits = self.data.chunks_exact(4).filter(|px| **px == pixel).count();
        hits as f64 / self.pixel_count() as f64
    }

    // -- Resampling -----------------------------------------------------------

    /// Resize to exactly `width` x `height` with the given filter.
    pub fn resized(&self, width: u32, height: u32, filter: FilterType) -> Self {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        let src = self.clone().into_rgba_image();
        Self::from_rgba_image(image::imageops::resize(&src, width.max(1), height.max(1), filter))
    }

    /// Downscale so the long edge is at most `max_dimension`. Never upscales.
    /// Returns the new buffer and the applied scale factor.
    pub fn fit_within(&self, max_dimension: u32) -> (Self, f64) {
        let long_edge = self.width.max(self.height);
        if long_edge <= max_dimension || long_edge == 0 {
            return (self.clone(), 1.0);
        }
        let scale = max_dimension as f64 / long_edge as f64;
        let w = ((self.width as f64 * scale).round() as u32).max(1);
        let h = ((self.height as f64 * scale).round() as u32).max(1);
        (self.resized(w, h, FilterType::Triangle), scale)
    }

    // -- Output ---------------------------------------------------------------

    /// Encode as PNG bytes (lossless).
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let image = DynamicImage::ImageRgba8(self.clone().into_rgba_image());
        image
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| ScanError::Encode(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode as JPEG bytes with the given quality (1-100). Alpha is dropped.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let rgb = DynamicImage::ImageRgba8(self.clone().into_rgba_image()).to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|err| ScanError::Encode(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }
}
