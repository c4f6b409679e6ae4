// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk page pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::geometry::{CropArea, Quad};

/// Unique identifier for a captured page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub Uuid);

impl PageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Accepted from the capture collaborator, not yet scheduled.
    Captured,
    /// Owned by a worker.
    Processing,
    /// Final image produced.
    Processed,
    /// Pipeline failed; see the page's error reason.
    Error,
}

impl PageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }
}

/// Lifecycle states of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Running,
    Done,
}

/// Boundary detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStrategy {
    /// Canny edges, contour tracing, polygon simplification.
    ContourBased,
    /// Canny edges, Hough line voting, line intersections.
    HoughBased,
    /// Brightness segmentation on a downscaled frame. Preview only.
    HeuristicFast,
}

impl DetectionStrategy {
    /// Whether a detection from this strategy may drive the final page image.
    pub fn is_final_grade(&self) -> bool {
        !matches!(self, Self::HeuristicFast)
    }
}

/// Standard paper sizes, used when pages are assembled at a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }
}

/// An opaque compressed image as handed over by the capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    /// Declared MIME type, e.g. `image/jpeg`. Empty when unknown.
    pub mime_type: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Guess the MIME type from a file extension.
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "tif" | "tiff" => "image/tiff",
            "bmp" => "image/bmp",
            _ => "",
        }
    }
}

/// Bookkeeping that follows a page through every state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub id: PageId,
    /// Position in reading order.
    pub index: usize,
    pub captured_at: DateTime<Utc>,
    pub status: PageStatus,
    pub error: Option<String>,
}

impl PageMeta {
    pub fn new(index: usize) -> Self {
        Self {
            id: PageId::new(),
            index,
            captured_at: Utc::now(),
            status: PageStatus::Captured,
            error: None,
        }
    }
}

/// A page as captured, before processing.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub meta: PageMeta,
    pub source: SourceImage,
}

impl CapturedPage {
    pub fn new(index: usize, source: SourceImage) -> Self {
        Self {
            meta: PageMeta::new(index),
            source,
        }
    }
}

/// A successfully rectified, enhanced, and compressed page.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPage {
    pub meta: PageMeta,
    /// Final JPEG bytes.
    #[serde(skip)]
    pub output: Vec<u8>,
    /// Preview JPEG bytes.
    #[serde(skip)]
    pub thumbnail: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Detected boundary in source coordinates; `None` when the full frame
    /// was used.
    pub quad: Option<Quad>,
    pub strategy: Option<DetectionStrategy>,
    pub crop: CropArea,
    pub output_size: usize,
    /// Hex SHA-256 of `output`.
    pub digest: String,
    /// Whether perspective correction was applied.
    pub corrected: bool,
    pub duration: Duration,
}

/// A page whose pipeline failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedPage {
    pub meta: PageMeta,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Terminal result for one page of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Processed(ProcessedPage),
    Failed(FailedPage),
}

impl PageOutcome {
    pub fn meta(&self) -> &PageMeta {
        match self {
            Self::Processed(page) => &page.meta,
            Self::Failed(page) => &page.meta,
        }
    }

    pub fn status(&self) -> PageStatus {
        self.meta().status
    }

    pub fn index(&self) -> usize {
        self.meta().index
    }

    pub fn as_processed(&self) -> Option<&ProcessedPage> {
        match self {
            Self::Processed(page) => Some(page),
            Self::Failed(_) => None,
        }
    }

    pub fn into_processed(self) -> Option<ProcessedPage> {
        match self {
            Self::Processed(page) => Some(page),
            Self::Failed(_) => None,
        }
    }
}

/// Default number of pages processed concurrently per group.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// An ordered set of captured pages awaiting processing.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub pages: Vec<CapturedPage>,
    pub batch_size: usize,
    completed: usize,
    pub state: BatchState,
}

impl BatchJob {
    pub fn new(batch_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            batch_size: batch_size.max(1),
            completed: 0,
            state: BatchState::Pending,
        }
    }

    /// Build a job from sources in reading order.
    pub fn from_sources(sources: impl IntoIterator<Item = SourceImage>, batch_size: usize) -> Self {
        let mut job = Self::new(batch_size);
        for source in sources {
            job.push(source);
        }
        job
    }

    /// Append a page at the next sequence index.
    pub fn push(&mut self, source: SourceImage) -> &PageMeta {
        let index = self.pages.len();
        self.pages.push(CapturedPage::new(index, source));
        &self.pages[index].meta
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Advance the completed count. The count never moves backwards and
    /// never exceeds `total`.
    pub fn record_completed(&mut self, count: usize, total: usize) -> usize {
        self.completed = self.completed.saturating_add(count).min(total);
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_assigns_sequential_indices() {
        let job = BatchJob::from_sources(
            (0..3).map(|i| SourceImage::new(vec![i], "image/png")),
            2,
        );
        let indices: Vec<usize> = job.pages.iter().map(|p| p.meta.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(job.pages.iter().all(|p| p.meta.status == PageStatus::Captured));
        assert_eq!(job.state, BatchState::Pending);
    }

    #[test]
    fn batch_size_is_at_least_one() {
        assert_eq!(BatchJob::new(0).batch_size, 1);
    }

    #[test]
    fn completed_count_is_monotonic_and_capped() {
        let mut job = BatchJob::new(5);
        assert_eq!(job.record_completed(5, 13), 5);
        assert_eq!(job.record_completed(5, 13), 10);
        assert_eq!(job.record_completed(5, 13), 13);
        assert_eq!(job.completed(), 13);
    }

    #[test]
    fn heuristic_is_not_final_grade() {
        assert!(DetectionStrategy::ContourBased.is_final_grade());
        assert!(DetectionStrategy::HoughBased.is_final_grade());
        assert!(!DetectionStrategy::HeuristicFast.is_final_grade());
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(SourceImage::mime_for_extension("JPG"), "image/jpeg");
        assert_eq!(SourceImage::mime_for_extension("xyz"), "");
    }
}
