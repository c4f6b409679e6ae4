// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-page pipeline: decode, clean a working copy and locate the page on
// it, correct perspective on the full-resolution pixels, enhance, compress,
// and thumbnail.
//
// Boundary and transform failures are recovered here; decode and encode
// failures propagate and make the page fatal.

use std::time::Instant;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{CapturedPage, CropArea, PageMeta, PageStatus, ProcessedPage, ScanConfig};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::buffer::PixelBuffer;
use crate::compress::{compress, thumbnail};
use crate::detect::{Detection, detect_boundary};
use crate::enhance::EnhancementPipeline;
use crate::perspective::rectify;

/// Processes one captured page at a time. Shareable across worker threads.
#[derive(Debug, Clone)]
pub struct PagePipeline {
    config: ScanConfig,
    enhancement: EnhancementPipeline,
}

impl PagePipeline {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            config: config.clone(),
            enhancement: EnhancementPipeline::from_config(config),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the full chain for one page.
    #[instrument(skip(self, page), fields(index = page.meta.index, id = %page.meta.id))]
    pub fn process(&self, page: CapturedPage) -> Result<ProcessedPage> {
        let started = Instant::now();
        let CapturedPage { meta, source } = page;

        let buf = PixelBuffer::decode(&source)?;
        drop(source);
        info!(src_w = buf.width(), src_h = buf.height(), "Processing page");

        let detection = match self.locate(&buf) {
            Ok(detection) => Some(detection),
            Err(ScanError::BoundaryNotFound) => {
                warn!("No document boundary found; using the full frame");
                None
            }
            Err(err) => return Err(err),
        };

        self.finish(buf, detection, meta, started)
    }

    /// Detect on a denoised, contrast-stretched working copy and map the
    /// result back onto `buf`.
    fn locate(&self, buf: &PixelBuffer) -> Result<Detection> {
        let (working, scale) = buf.fit_within(self.config.detection.working_dimension);
        let working = self.enhancement.prepare_for_detection(working);
        let detection = detect_boundary(&working, &self.config.detection)?;
        Ok(Detection {
            quad: detection.quad.scaled(1.0 / scale).clamped(buf.width(), buf.height()),
            ..detection
        })
    }

    /// Crop, correct, enhance, and encode a decoded page.
    ///
    /// A quad that cannot be rectified leaves the page uncorrected at its
    /// source size.
    fn finish(
        &self,
        buf: PixelBuffer,
        detection: Option<Detection>,
        mut meta: PageMeta,
        started: Instant,
    ) -> Result<ProcessedPage> {
        let (src_w, src_h) = buf.dimensions();
        let crop = detection
            .map(|d| d.quad.bounding_box(src_w, src_h))
            .unwrap_or_else(|| CropArea::full(src_w, src_h));

        let (rectified, corrected) = match &detection {
            Some(d) => match rectify(&buf, &d.quad) {
                Ok(out) => (out, true),
                Err(ScanError::SingularTransform(reason)) => {
                    warn!(%reason, "Perspective correction skipped");
                    (buf, false)
                }
                Err(err) => return Err(err),
            },
            None => (buf, false),
        };

        let enhanced = self.enhancement.run(rectified);
        let compressed = compress(
            &enhanced,
            self.config.max_output_bytes,
            self.config.target_resolution,
            self.config.encode_quality,
        )?;
        let thumb = thumbnail(
            &enhanced,
            self.config.thumbnail_width,
            self.config.thumbnail_height,
        )?;
        drop(enhanced);

        let digest = hex::encode(Sha256::digest(&compressed.bytes));
        meta.status = PageStatus::Processed;
        meta.error = None;

        let duration = started.elapsed();
        debug!(
            width = compressed.width,
            height = compressed.height,
            bytes = compressed.bytes.len(),
            quality = compressed.quality,
            budget_exceeded = compressed.budget_exceeded,
            ?duration,
            "Page processed"
        );

        Ok(ProcessedPage {
            meta,
            output_size: compressed.bytes.len(),
            output: compressed.bytes,
            thumbnail: thumb.bytes,
            width: compressed.width,
            height: compressed.height,
            quad: detection.map(|d| d.quad),
            strategy: detection.map(|d| d.strategy),
            crop,
            digest,
            corrected,
            duration,
        })
    }
}
