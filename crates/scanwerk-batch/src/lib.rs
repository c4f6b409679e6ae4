// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk batch: group-wise page processing with a worker pool, memory
// backpressure, cooperative cancellation, and the upload hand-off.

pub mod cancel;
pub mod memory;
pub mod orchestrator;
pub mod pool;
pub mod upload;

pub use cancel::CancellationToken;
pub use memory::{MemoryMonitor, MemoryProbe, MemorySnapshot, SysinfoProbe};
pub use orchestrator::{BatchOrchestrator, BatchReport, NoProgress, PageProcessor, ProgressSink};
pub use pool::WorkerPool;
pub use upload::{DirectoryUploader, DocumentUploader, UploadError, upload_document};
