// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch orchestrator: runs a job's pages in fixed-size groups.
//
// Pages inside a group run concurrently on the worker pool; groups run one
// after another. Every page ends in a terminal outcome: a page error or panic
// becomes a failed outcome for that page only, and pages skipped because of
// cancellation are failed with `ErrorKind::Cancelled`. Outcomes are returned
// in input order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{
    BatchJob, BatchState, CapturedPage, ErrorKind, FailedPage, PageId, PageMeta, PageOutcome,
    PageStatus, ProcessedPage, ScanConfig, SourceImage,
};
use scanwerk_imaging::PagePipeline;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::CancellationToken;
use crate::memory::MemoryMonitor;
use crate::pool::WorkerPool;

/// Turns one captured page into a processed page.
pub trait PageProcessor: Send + Sync {
    fn process(&self, page: CapturedPage) -> Result<ProcessedPage>;
}

impl PageProcessor for PagePipeline {
    fn process(&self, page: CapturedPage) -> Result<ProcessedPage> {
        PagePipeline::process(self, page)
    }
}

/// Receives `(pages_completed, pages_total)` after each group.
pub trait ProgressSink: Send + Sync {
    fn report(&self, completed: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// A sink that ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _completed: usize, _total: usize) {}
}

/// Everything a finished batch produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// One terminal outcome per input page, in input order.
    pub outcomes: Vec<PageOutcome>,
    /// Whether cancellation stopped the batch early.
    pub cancelled: bool,
    pub duration: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.as_processed().is_some()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.total() - self.processed_count()
    }

    /// Processed pages in input order, ready for assembly.
    pub fn processed_pages(&self) -> impl Iterator<Item = &ProcessedPage> {
        self.outcomes.iter().filter_map(PageOutcome::as_processed)
    }
}

/// Owns the configuration, worker pool, memory monitor, and cancellation
/// flag for a capture session.
pub struct BatchOrchestrator {
    config: ScanConfig,
    processor: Arc<dyn PageProcessor>,
    pool: WorkerPool,
    memory: MemoryMonitor,
    cancel: CancellationToken,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("preset", &self.config.preset)
            .field("batch_size", &self.config.batch_size)
            .field("pool", &self.pool)
            .field("memory", &self.memory)
            .finish()
    }
}

impl BatchOrchestrator {
    // -- Construction ---------------------------------------------------------

    /// Validate `config` and build the pipeline, pool, and monitor from it.
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        let processor: Arc<dyn PageProcessor> = Arc::new(PagePipeline::from_config(&config));
        let pool = WorkerPool::new(config.parallel, config.worker_threads);
        let memory = MemoryMonitor::new(&config.memory);
        info!(
            preset = ?config.preset,
            batch_size = config.batch_size,
            threads = pool.threads(),
            "Batch orchestrator ready"
        );
        Ok(Self {
            config,
            processor,
            pool,
            memory,
            cancel: CancellationToken::new(),
        })
    }

    /// Replace the page processor.
    pub fn with_processor(mut self, processor: Arc<dyn PageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_memory_monitor(mut self, memory: MemoryMonitor) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    // -- Accessors ------------------------------------------------------------

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryMonitor {
        &self.memory
    }

    /// Memory pressure flag, updated at every check.
    pub fn pressure_signal(&self) -> watch::Receiver<bool> {
        self.memory.subscribe()
    }

    /// Handle for cancelling the batch in flight. A cancellation made while
    /// no batch runs applies to the next one. The token is cleared when the
    /// batch it stopped finishes, so later batches run normally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -- Capture --------------------------------------------------------------

    /// An empty job using the configured batch size.
    pub fn new_job(&self) -> BatchJob {
        BatchJob::new(self.config.batch_size)
    }

    /// Add a capture to `job` unless memory is under pressure.
    pub fn accept_capture(&self, job: &mut BatchJob, source: SourceImage) -> Result<PageId> {
        if let Err(err) = self.memory.try_accept_capture() {
            warn!(%err, pages = job.len(), "Capture refused");
            return Err(err);
        }
        let meta = job.push(source);
        debug!(index = meta.index, id = %meta.id, "Capture accepted");
        Ok(meta.id)
    }

    // -- Processing -----------------------------------------------------------

    /// Process every page of `job`, reporting progress after each group.
    #[instrument(skip(self, job, progress), fields(pages = job.len(), batch_size = job.batch_size))]
    pub fn process(&self, mut job: BatchJob, progress: &dyn ProgressSink) -> BatchReport {
        let started = Instant::now();
        let total = job.len();
        let group_size = job.batch_size.max(1);
        job.state = BatchState::Running;
        info!(total, parallel = self.pool.is_parallel(), "Batch started");

        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total);
        let mut pages = std::mem::take(&mut job.pages).into_iter();
        let mut cancelled = false;

        loop {
            if self.cancel.is_cancelled() {
                let skipped: Vec<PageOutcome> = pages.by_ref().map(|p| cancelled_outcome(p.meta)).collect();
                if !skipped.is_empty() {
                    warn!(skipped = skipped.len(), "Batch cancelled; remaining pages skipped");
                    let done = job.record_completed(skipped.len(), total);
                    outcomes.extend(skipped);
                    progress.report(done, total);
                }
                cancelled = true;
                break;
            }

            let group: Vec<CapturedPage> = pages.by_ref().take(group_size).collect();
            if group.is_empty() {
                break;
            }
            let group_len = group.len();
            let results = self.pool.map(group, |page| self.run_page(page));
            // Source buffers went into the group and are dropped with it.
            outcomes.extend(results);

            let done = job.record_completed(group_len, total);
            progress.report(done, total);
            debug!(done, total, "Group finished");

            let snapshot = self.memory.check();
            if snapshot.under_pressure {
                warn!(
                    used_bytes = snapshot.used_bytes,
                    budget_bytes = snapshot.budget_bytes,
                    "Memory under pressure between groups"
                );
            }
            self.pause_between_groups();
        }

        job.state = BatchState::Done;
        cancelled |= outcomes
            .iter()
            .any(|o| matches!(o, PageOutcome::Failed(f) if f.kind == ErrorKind::Cancelled));
        if cancelled {
            self.cancel.reset();
        }
        let report = BatchReport {
            outcomes,
            cancelled,
            duration: started.elapsed(),
        };
        info!(
            processed = report.processed_count(),
            failed = report.failed_count(),
            cancelled,
            duration = ?report.duration,
            "Batch finished"
        );
        report
    }

    /// Run `process` on tokio's blocking pool.
    pub async fn process_async<P>(self: Arc<Self>, job: BatchJob, progress: P) -> Result<BatchReport>
    where
        P: ProgressSink + 'static,
    {
        tokio::task::spawn_blocking(move || self.process(job, &progress))
            .await
            .map_err(|err| ScanError::Panicked(format!("batch task failed: {}", err)))
    }

    fn pause_between_groups(&self) {
        match self.config.inter_batch_pause_ms {
            0 => std::thread::yield_now(),
            ms => std::thread::sleep(Duration::from_millis(ms)),
        }
    }

    /// One page, with every error and panic converted into its outcome.
    fn run_page(&self, mut page: CapturedPage) -> PageOutcome {
        if self.cancel.is_cancelled() {
            return cancelled_outcome(page.meta);
        }
        page.meta.status = PageStatus::Processing;
        let meta = page.meta.clone();

        match catch_unwind(AssertUnwindSafe(|| self.processor.process(page))) {
            Ok(Ok(processed)) => PageOutcome::Processed(processed),
            Ok(Err(err)) => {
                warn!(index = meta.index, %err, "Page failed");
                failed_outcome(meta, err.kind(), err.to_string())
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(index = meta.index, %reason, "Page pipeline panicked");
                failed_outcome(meta, ErrorKind::Internal, ScanError::Panicked(reason).to_string())
            }
        }
    }
}

fn failed_outcome(mut meta: PageMeta, kind: ErrorKind, reason: String) -> PageOutcome {
    meta.status = PageStatus::Error;
    meta.error = Some(reason.clone());
    PageOutcome::Failed(FailedPage { meta, kind, reason })
}

fn cancelled_outcome(meta: PageMeta) -> PageOutcome {
    failed_outcome(meta, ErrorKind::Cancelled, "cancelled".to_string())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use scanwerk_core::{CropArea, MemoryConfig};

    use super::*;
    use crate::memory::MemoryProbe;

    /// Echoes the first source byte back as the output; panics on 0xFF and
    /// fails on 0xEE.
    struct EchoProcessor {
        cancel_at: Option<(usize, CancellationToken)>,
    }

    impl PageProcessor for EchoProcessor {
        fn process(&self, page: CapturedPage) -> Result<ProcessedPage> {
            if let Some((index, token)) = &self.cancel_at {
                if page.meta.index == *index {
                    token.cancel();
                }
            }
            let marker = page.source.bytes.first().copied().unwrap_or(0);
            match marker {
                0xFF => panic!("boom on page {}", page.meta.index),
                0xEE => return Err(ScanError::Decode("bad bytes".into())),
                _ => {}
            }
            let mut meta = page.meta;
            meta.status = PageStatus::Processed;
            Ok(ProcessedPage {
                meta,
                output: vec![marker],
                thumbnail: Vec::new(),
                width: 1,
                height: 1,
                quad: None,
                strategy: None,
                crop: CropArea::full(1, 1),
                output_size: 1,
                digest: String::new(),
                corrected: false,
                duration: Duration::ZERO,
            })
        }
    }

    fn orchestrator(batch_size: usize, parallel: bool, processor: EchoProcessor) -> BatchOrchestrator {
        let config = ScanConfig {
            batch_size,
            parallel,
            worker_threads: Some(3),
            ..ScanConfig::default()
        };
        BatchOrchestrator::new(config)
            .expect("valid config")
            .with_processor(Arc::new(processor))
    }

    fn job(markers: &[u8], batch_size: usize) -> BatchJob {
        BatchJob::from_sources(
            markers.iter().map(|m| SourceImage::new(vec![*m], "image/png")),
            batch_size,
        )
    }

    #[test]
    fn progress_is_reported_per_group() {
        let orch = orchestrator(5, true, EchoProcessor { cancel_at: None });
        let seen = Mutex::new(Vec::new());
        let report = orch.process(job(&[1; 13], 5), &|done: usize, total: usize| {
            seen.lock().expect("lock").push((done, total));
        });
        assert_eq!(report.total(), 13);
        assert_eq!(
            seen.into_inner().expect("lock"),
            vec![(5, 13), (10, 13), (13, 13)]
        );
    }

    #[test]
    fn failures_and_panics_stay_on_their_page() {
        let orch = orchestrator(2, true, EchoProcessor { cancel_at: None });
        let report = orch.process(job(&[1, 0xFF, 2, 0xEE, 3], 2), &NoProgress);

        assert_eq!(report.total(), 5);
        assert_eq!(report.processed_count(), 3);
        let kinds: Vec<Option<ErrorKind>> = report
            .outcomes
            .iter()
            .map(|o| match o {
                PageOutcome::Failed(f) => Some(f.kind),
                PageOutcome::Processed(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![None, Some(ErrorKind::Internal), None, Some(ErrorKind::DecodeFailure), None]
        );
        for outcome in &report.outcomes {
            assert!(outcome.status().is_terminal());
            if outcome.status() == PageStatus::Error {
                assert!(outcome.meta().error.is_some());
            }
        }
    }

    #[test]
    fn outcomes_follow_input_order() {
        let orch = orchestrator(4, true, EchoProcessor { cancel_at: None });
        let markers: Vec<u8> = (10..30).collect();
        let report = orch.process(job(&markers, 4), &NoProgress);
        let echoed: Vec<u8> = report.processed_pages().map(|p| p.output[0]).collect();
        assert_eq!(echoed, markers);
        let indices: Vec<usize> = report.outcomes.iter().map(PageOutcome::index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn cancellation_fails_remaining_pages() {
        let base = orchestrator(2, false, EchoProcessor { cancel_at: None });
        let token = base.cancellation_token();
        let orch = base.with_processor(Arc::new(EchoProcessor {
            cancel_at: Some((2, token)),
        }));

        let report = orch.process(job(&[1, 2, 3, 4, 5], 2), &NoProgress);
        assert!(report.cancelled);
        assert_eq!(report.total(), 5);
        assert_eq!(report.processed_count(), 3);
        for outcome in &report.outcomes[3..] {
            match outcome {
                PageOutcome::Failed(f) => {
                    assert_eq!(f.kind, ErrorKind::Cancelled);
                    assert_eq!(f.reason, "cancelled");
                }
                PageOutcome::Processed(_) => panic!("page after cancellation was processed"),
            }
        }
    }

    #[test]
    fn cancellation_is_cleared_after_the_stopped_batch() {
        let orch = orchestrator(2, false, EchoProcessor { cancel_at: None });
        let token = orch.cancellation_token();
        token.cancel();

        let stopped = orch.process(job(&[1, 2, 3], 2), &NoProgress);
        assert!(stopped.cancelled);
        assert_eq!(stopped.processed_count(), 0);
        assert!(!token.is_cancelled());

        let next = orch.process(job(&[4, 5, 6], 2), &NoProgress);
        assert!(!next.cancelled);
        assert_eq!(next.processed_count(), 3);
    }

    #[test]
    fn empty_job_reports_nothing() {
        let orch = orchestrator(5, true, EchoProcessor { cancel_at: None });
        let calls = Mutex::new(0);
        let report = orch.process(job(&[], 5), &|_: usize, _: usize| {
            *calls.lock().expect("lock") += 1;
        });
        assert_eq!(report.total(), 0);
        assert_eq!(calls.into_inner().expect("lock"), 0);
    }

    struct Saturated;

    impl MemoryProbe for Saturated {
        fn used_bytes(&self) -> u64 {
            u64::MAX
        }
    }

    #[test]
    fn captures_refused_under_pressure() {
        let orch = orchestrator(5, false, EchoProcessor { cancel_at: None })
            .with_memory_monitor(MemoryMonitor::with_probe(
                &MemoryConfig::default(),
                Arc::new(Saturated),
            ));
        let mut job = orch.new_job();
        let err = orch
            .accept_capture(&mut job, SourceImage::new(vec![1], "image/png"))
            .unwrap_err();
        assert!(matches!(err, ScanError::ResourceExhausted { .. }));
        assert!(job.is_empty());
        assert!(*orch.pressure_signal().borrow());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ScanConfig {
            batch_size: 0,
            ..ScanConfig::default()
        };
        assert!(matches!(
            BatchOrchestrator::new(config),
            Err(ScanError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn async_facade_runs_on_blocking_pool() {
        let orch = Arc::new(orchestrator(3, true, EchoProcessor { cancel_at: None }));
        let report = orch
            .process_async(job(&[1, 2, 3, 4], 3), NoProgress)
            .await
            .expect("join");
        assert_eq!(report.processed_count(), 4);
        assert!(!report.cancelled);
    }
}
