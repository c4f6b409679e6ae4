// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker pool owned by the orchestrator, with an explicit sequential path.

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{info, warn};

/// Runs one group of pages at a time, in parallel when a pool is available.
pub struct WorkerPool {
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

impl WorkerPool {
    /// Build a pool of `threads` workers (default: available parallelism).
    /// Falls back to sequential execution when `parallel` is false or the
    /// pool cannot be created.
    pub fn new(parallel: bool, threads: Option<usize>) -> Self {
        if !parallel {
            info!("Parallel processing disabled; pages run sequentially");
            return Self::sequential();
        }
        let threads = threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        if threads <= 1 {
            return Self::sequential();
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("scanwerk-worker-{i}"))
            .build()
        {
            Ok(pool) => {
                info!(threads, "Worker pool started");
                Self { pool: Some(pool) }
            }
            Err(err) => {
                warn!(%err, "Could not start worker pool; falling back to sequential");
                Self::sequential()
            }
        }
    }

    pub fn sequential() -> Self {
        Self { pool: None }
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, ThreadPool::current_num_threads)
    }

    /// Apply `f` to every item. Results come back in input order whichever
    /// order the workers finish in.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map(&f).collect()),
            None => items.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parallel_map_preserves_order() {
        let pool = WorkerPool::new(true, Some(4));
        let items: Vec<u64> = (0..32).collect();
        // Earlier items sleep longer, so they finish last.
        let out = pool.map(items, |i| {
            std::thread::sleep(Duration::from_millis(32 - i));
            i * 10
        });
        assert_eq!(out, (0..32).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn disabled_parallelism_is_sequential() {
        let pool = WorkerPool::new(false, Some(8));
        assert!(!pool.is_parallel());
        assert_eq!(pool.threads(), 1);
        assert_eq!(pool.map(vec![1, 2, 3], |i| i + 1), vec![2, 3, 4]);
    }

    #[test]
    fn single_thread_request_is_sequential() {
        assert!(!WorkerPool::new(true, Some(1)).is_parallel());
    }
}
