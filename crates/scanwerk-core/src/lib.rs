// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk: Core types, geometry, configuration, and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod types;

pub use config::{DetectionConfig, MemoryConfig, PageLayout, QualityPreset, ScanConfig};
pub use error::{ErrorKind, ScanError};
pub use geometry::{CropArea, Point, Quad};
pub use types::*;
