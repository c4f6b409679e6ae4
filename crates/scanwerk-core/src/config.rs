// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan configuration. Built once from a quality preset (optionally overridden
// from JSON) and handed to the orchestrator at construction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::types::{DEFAULT_BATCH_SIZE, DetectionStrategy, PaperSize};

/// Named quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Fast,
    #[default]
    Balanced,
    Best,
}

impl std::str::FromStr for QualityPreset {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "best" => Ok(Self::Best),
            other => Err(ScanError::InvalidConfig(format!("unknown preset '{other}'"))),
        }
    }
}

/// How assembled PDF pages are sized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PageLayout {
    /// One page per image, sized to the image at `dpi`.
    ImageSized { dpi: f32 },
    /// Every page uses the same paper size; the image is stretched to fill it.
    Fixed { paper: PaperSize },
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::ImageSized { dpi: 200.0 }
    }
}

/// Tunables for boundary detection. None of these values are load-bearing
/// beyond the qualitative behaviour of each detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Strategies tried in order for the final page image.
    pub strategies: Vec<DetectionStrategy>,
    /// Long edge of the working copy used for detection.
    pub working_dimension: u32,
    /// Strong-edge threshold as a fraction of the maximum gradient.
    pub canny_high_ratio: f32,
    /// Weak-edge threshold as a fraction of the strong threshold.
    pub canny_low_ratio: f32,
    /// Smallest accepted quad, as a fraction of the image area.
    pub min_area_ratio: f64,
    /// Douglas–Peucker tolerance as a fraction of the contour perimeter.
    ///
    /// The tolerance is a distance in pixels, so it scales with the
    /// contour's length and not with its enclosed area.
    pub simplify_epsilon_ratio: f64,
    /// Edge components with fewer pixels are dropped before tracing.
    pub min_contour_pixels: usize,
    /// Hough threshold on the vote sum of a 3 x 3 accumulator window, as a
    /// fraction of the shorter image side.
    pub hough_vote_ratio: f64,
    /// Edge pixels this close to an extracted Hough line, in pixels, stop
    /// voting for later lines.
    pub hough_suppression_radius: usize,
    /// Maximum deviation from horizontal/vertical for Hough lines, degrees.
    pub hough_angle_tolerance_deg: f64,
    /// Smallest Hough quad (estimated width x height) as a fraction of the
    /// image area.
    pub hough_min_area_ratio: f64,
    /// Long edge of the frame used by the preview heuristic.
    pub preview_dimension: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strategies: vec![DetectionStrategy::ContourBased, DetectionStrategy::HoughBased],
            working_dimension: 1000,
            canny_high_ratio: 0.15,
            canny_low_ratio: 0.4,
            min_area_ratio: 0.01,
            simplify_epsilon_ratio: 0.02,
            min_contour_pixels: 20,
            hough_vote_ratio: 0.25,
            hough_suppression_radius: 8,
            hough_angle_tolerance_deg: 20.0,
            hough_min_area_ratio: 0.20,
            preview_dimension: 256,
        }
    }
}

/// Cooperative memory backpressure settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Memory budget for the process, in bytes.
    pub budget_bytes: u64,
    /// Fraction of the budget at which new captures are refused.
    pub pressure_ratio: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 1024 * 1024 * 1024,
            pressure_ratio: 0.9,
        }
    }
}

/// Complete configuration consumed by the page pipeline and orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub preset: QualityPreset,
    /// Maximum long edge of the final page image, in pixels.
    pub target_resolution: u32,
    /// Encode quality in (0, 1].
    pub encode_quality: f32,
    /// Byte budget for one encoded page.
    pub max_output_bytes: usize,
    pub contrast_factor: f32,
    /// Target mean brightness (0-255).
    pub brightness_target: f32,
    /// Median filter window; 1 disables noise reduction.
    pub noise_kernel: u32,
    pub sharpen_strength: f32,
    /// Convert pages to grayscale.
    pub grayscale: bool,
    pub batch_size: usize,
    pub parallel: bool,
    /// Worker count; `None` uses the available hardware concurrency.
    pub worker_threads: Option<usize>,
    /// Pause between groups, in milliseconds. Zero only yields.
    pub inter_batch_pause_ms: u64,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub detection: DetectionConfig,
    pub memory: MemoryConfig,
    pub layout: PageLayout,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from_preset(QualityPreset::Balanced)
    }
}

impl ScanConfig {
    /// Configuration for a named preset.
    pub fn from_preset(preset: QualityPreset) -> Self {
        let (target_resolution, encode_quality, contrast_factor, brightness_target, max_output_bytes) =
            match preset {
                QualityPreset::Fast => (1600, 0.70, 1.2, 175.0, 400 * 1024),
                QualityPreset::Balanced => (2400, 0.82, 1.5, 180.0, 900 * 1024),
                QualityPreset::Best => (3508, 0.92, 2.0, 185.0, 2 * 1024 * 1024),
            };
        Self {
            preset,
            target_resolution,
            encode_quality,
            max_output_bytes,
            contrast_factor,
            brightness_target,
            noise_kernel: 3,
            sharpen_strength: if preset == QualityPreset::Fast { 0.0 } else { 0.5 },
            grayscale: false,
            batch_size: DEFAULT_BATCH_SIZE,
            parallel: true,
            worker_threads: None,
            inter_batch_pause_ms: 0,
            thumbnail_width: 240,
            thumbnail_height: 320,
            detection: DetectionConfig::default(),
            memory: MemoryConfig::default(),
            layout: PageLayout::default(),
        }
    }

    /// Check documented value ranges.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ScanError::InvalidConfig(msg));

        if self.target_resolution == 0 {
            return fail("target_resolution must be > 0".into());
        }
        if !(self.encode_quality > 0.0 && self.encode_quality <= 1.0) {
            return fail(format!("encode_quality {} outside (0, 1]", self.encode_quality));
        }
        if self.batch_size == 0 {
            return fail("batch_size must be >= 1".into());
        }
        if self.max_output_bytes == 0 {
            return fail("max_output_bytes must be > 0".into());
        }
        if !self.contrast_factor.is_finite() || self.contrast_factor <= 0.0 {
            return fail(format!("contrast_factor {} must be positive", self.contrast_factor));
        }
        if !(0.0..=255.0).contains(&self.brightness_target) {
            return fail(format!("brightness_target {} outside [0, 255]", self.brightness_target));
        }
        if !self.sharpen_strength.is_finite() || self.sharpen_strength < 0.0 {
            return fail("sharpen_strength must be >= 0".into());
        }
        if self.thumbnail_width == 0 || self.thumbnail_height == 0 {
            return fail("thumbnail dimensions must be > 0".into());
        }
        if self.worker_threads == Some(0) {
            return fail("worker_threads must be >= 1 when set".into());
        }

        let det = &self.detection;
        if det.strategies.is_empty() {
            return fail("at least one detection strategy is required".into());
        }
        if let Some(s) = det.strategies.iter().find(|s| !s.is_final_grade()) {
            return fail(format!("{s:?} is preview-only and cannot drive final output"));
        }
        if det.working_dimension == 0 || det.preview_dimension == 0 {
            return fail("detection dimensions must be > 0".into());
        }
        let unit = |v: f64| v > 0.0 && v <= 1.0;
        if !unit(det.canny_high_ratio as f64) || !unit(det.canny_low_ratio as f64) {
            return fail("canny ratios must lie in (0, 1]".into());
        }
        if !unit(det.min_area_ratio) || !unit(det.hough_min_area_ratio) || !unit(det.hough_vote_ratio) {
            return fail("area and vote ratios must lie in (0, 1]".into());
        }
        if !(det.simplify_epsilon_ratio > 0.0) {
            return fail("simplify_epsilon_ratio must be > 0".into());
        }

        if !unit(self.memory.pressure_ratio) || self.memory.budget_bytes == 0 {
            return fail("memory pressure_ratio must lie in (0, 1] with a non-zero budget".into());
        }
        match self.layout {
            PageLayout::ImageSized { dpi } if !(dpi > 0.0) => fail("layout dpi must be > 0".into()),
            PageLayout::Fixed { paper } if paper.dimensions_mm().0 == 0 || paper.dimensions_mm().1 == 0 => {
                fail("paper dimensions must be > 0".into())
            }
            _ => Ok(()),
        }
    }

    /// Parse a JSON document. Missing fields take the balanced defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for preset in [QualityPreset::Fast, QualityPreset::Balanced, QualityPreset::Best] {
            ScanConfig::from_preset(preset).validate().expect("preset must validate");
        }
    }

    #[test]
    fn presets_scale_quality() {
        let fast = ScanConfig::from_preset(QualityPreset::Fast);
        let best = ScanConfig::from_preset(QualityPreset::Best);
        assert!(fast.target_resolution < best.target_resolution);
        assert!(fast.encode_quality < best.encode_quality);
        assert!(fast.contrast_factor < best.contrast_factor);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = ScanConfig::default();
        cfg.encode_quality = 0.0;
        assert!(matches!(cfg.validate(), Err(ScanError::InvalidConfig(_))));

        let mut cfg = ScanConfig::default();
        cfg.encode_quality = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::default();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::default();
        cfg.target_resolution = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_edge_of_documented_ranges() {
        let mut cfg = ScanConfig::default();
        cfg.encode_quality = 1.0;
        cfg.batch_size = 1;
        cfg.target_resolution = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn preview_strategy_cannot_drive_final_output() {
        let mut cfg = ScanConfig::default();
        cfg.detection.strategies = vec![DetectionStrategy::HeuristicFast];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ScanConfig::from_json(r#"{ "batch_size": 3, "grayscale": true }"#)
            .expect("partial config parses");
        assert_eq!(cfg.batch_size, 3);
        assert!(cfg.grayscale);
        assert_eq!(cfg.detection, DetectionConfig::default());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.json");
        let mut cfg = ScanConfig::from_preset(QualityPreset::Best);
        cfg.layout = PageLayout::Fixed { paper: PaperSize::A4 };
        cfg.save(&path).expect("save");
        assert_eq!(ScanConfig::load(&path).expect("load"), cfg);
    }

    #[test]
    fn preset_parsing() {
        assert_eq!("FAST".parse::<QualityPreset>().ok(), Some(QualityPreset::Fast));
        assert!("ultra".parse::<QualityPreset>().is_err());
    }
}
