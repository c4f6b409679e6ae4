// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document boundary detection: one detector, three strategies.
//
// Contour and Hough detection share a Canny edge map computed on a working
// copy downscaled to `DetectionConfig::working_dimension`. Quads come back in
// the coordinate space of the buffer that was passed in.

pub mod contour;
pub mod heuristic;
pub mod hough;

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{DetectionConfig, DetectionStrategy, Quad};
use tracing::{debug, info, instrument, warn};

use crate::buffer::PixelBuffer;
use crate::edges::{CannyParams, EdgeMap, canny};

pub use heuristic::{PreviewQuad, detect_preview};

/// A located boundary and the strategy that found it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub quad: Quad,
    pub strategy: DetectionStrategy,
}

/// Locates a document boundary with one fixed strategy.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    strategy: DetectionStrategy,
    config: DetectionConfig,
}

impl BoundaryDetector {
    pub fn new(strategy: DetectionStrategy, config: DetectionConfig) -> Self {
        Self { strategy, config }
    }

    pub fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    /// Run this detector's strategy on `buf`.
    #[instrument(skip(self, buf), fields(strategy = ?self.strategy, width = buf.width(), height = buf.height()))]
    pub fn detect(&self, buf: &PixelBuffer) -> Result<Detection> {
        let working = WorkingCopy::new(buf, &self.config);
        let quad = working.locate(self.strategy, &self.config)?;
        Ok(Detection {
            quad: working.to_source(&quad),
            strategy: self.strategy,
        })
    }
}

/// Try the configured strategy chain in order and return the first boundary
/// found. Strategies that are not final-grade are skipped.
#[instrument(skip(buf, config), fields(width = buf.width(), height = buf.height()))]
pub fn detect_boundary(buf: &PixelBuffer, config: &DetectionConfig) -> Result<Detection> {
    if buf.is_empty() {
        return Err(ScanError::BoundaryNotFound);
    }
    let working = WorkingCopy::new(buf, config);

    for &strategy in &config.strategies {
        if !strategy.is_final_grade() {
            warn!(?strategy, "Strategy is preview-only; skipped for final output");
            continue;
        }
        match working.locate(strategy, config) {
            Ok(quad) => {
                let quad = working.to_source(&quad);
                info!(?strategy, area = quad.area(), "Document boundary found");
                return Ok(Detection { quad, strategy });
            }
            Err(ScanError::BoundaryNotFound) => {
                debug!(?strategy, "No boundary from strategy");
            }
            Err(err) => return Err(err),
        }
    }

    Err(ScanError::BoundaryNotFound)
}

/// Downscaled copy of the input plus its lazily computed edge map.
struct WorkingCopy {
    buf: PixelBuffer,
    scale: f64,
    source_width: u32,
    source_height: u32,
    edges: std::cell::OnceCell<EdgeMap>,
    params: CannyParams,
}

impl WorkingCopy {
    fn new(source: &PixelBuffer, config: &DetectionConfig) -> Self {
        let (buf, scale) = source.fit_within(config.working_dimension);
        debug!(
            working_width = buf.width(),
            working_height = buf.height(),
            scale,
            "Working copy prepared"
        );
        Self {
            buf,
            scale,
            source_width: source.width(),
            source_height: source.height(),
            edges: std::cell::OnceCell::new(),
            params: CannyParams {
                high_ratio: config.canny_high_ratio,
                low_ratio: config.canny_low_ratio,
            },
        }
    }

    fn edges(&self) -> &EdgeMap {
        self.edges.get_or_init(|| canny(&self.buf, self.params))
    }

    fn locate(&self, strategy: DetectionStrategy, config: &DetectionConfig) -> Result<Quad> {
        match strategy {
            DetectionStrategy::ContourBased => contour::locate(self.edges(), config),
            DetectionStrategy::HoughBased => hough::locate(self.edges(), config),
            DetectionStrategy::HeuristicFast => heuristic::locate(&self.buf, config),
        }
    }

    fn to_source(&self, quad: &Quad) -> Quad {
        quad.scaled(1.0 / self.scale)
            .clamped(self.source_width, self.source_height)
    }
}
