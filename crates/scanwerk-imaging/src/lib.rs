// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk imaging: pixel buffers, enhancement, edge and boundary detection,
// perspective correction, compression, and PDF assembly.

pub mod buffer;
pub mod compress;
pub mod contour;
pub mod detect;
pub mod edges;
pub mod enhance;
pub mod pdf;
pub mod perspective;
pub mod pipeline;

pub use buffer::PixelBuffer;
pub use compress::{CompressedImage, Thumbnail, compress, thumbnail};
pub use detect::{BoundaryDetector, Detection, PreviewQuad, detect_boundary, detect_preview};
pub use enhance::EnhancementPipeline;
pub use pdf::{AssembledDocument, DocumentAssembler};
pub use perspective::{Homography, estimate_homography, rectify, warp};
pub use pipeline::PagePipeline;
