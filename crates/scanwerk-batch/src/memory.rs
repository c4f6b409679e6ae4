// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Memory backpressure: sample process memory against a budget, refuse new
// captures near the limit, and publish a pressure flag.
//
// The monitor is cooperative. It never interrupts a page that is already
// being processed; it only gates acceptance of new work.

use std::sync::{Arc, Mutex};

use scanwerk_core::MemoryConfig;
use scanwerk_core::error::{Result, ScanError};
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Source of the current memory figure.
pub trait MemoryProbe: Send + Sync {
    /// Bytes currently in use.
    fn used_bytes(&self) -> u64;
}

/// Resident memory of this process, via `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|err| warn!(err, "Current process id unavailable; memory reads as zero"))
            .ok();
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn used_bytes(&self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        let mut system = self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_process(pid);
        system.process(pid).map_or(0, |process| process.memory())
    }
}

/// One memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub budget_bytes: u64,
    pub under_pressure: bool,
}

/// Compares memory use against the configured budget.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    budget_bytes: u64,
    pressure_ratio: f64,
    pressure: watch::Sender<bool>,
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("budget_bytes", &self.budget_bytes)
            .field("pressure_ratio", &self.pressure_ratio)
            .field("under_pressure", &*self.pressure.borrow())
            .finish()
    }
}

impl MemoryMonitor {
    /// Monitor this process with `sysinfo`.
    pub fn new(config: &MemoryConfig) -> Self {
        Self::with_probe(config, Arc::new(SysinfoProbe::new()))
    }

    pub fn with_probe(config: &MemoryConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        let (pressure, _) = watch::channel(false);
        Self {
            probe,
            budget_bytes: config.budget_bytes,
            pressure_ratio: config.pressure_ratio,
            pressure,
        }
    }

    /// Usage at or above this many bytes counts as pressure.
    pub fn threshold_bytes(&self) -> u64 {
        (self.budget_bytes as f64 * self.pressure_ratio) as u64
    }

    /// Sample memory and publish the pressure flag.
    pub fn check(&self) -> MemorySnapshot {
        let used_bytes = self.probe.used_bytes();
        let under_pressure = used_bytes >= self.threshold_bytes();
        let previous = self.pressure.send_replace(under_pressure);
        if under_pressure != previous {
            if under_pressure {
                warn!(used_bytes, budget_bytes = self.budget_bytes, "Memory pressure raised");
            } else {
                debug!(used_bytes, "Memory pressure cleared");
            }
        }
        MemorySnapshot {
            used_bytes,
            budget_bytes: self.budget_bytes,
            under_pressure,
        }
    }

    /// Gate for new captures. Refuses with `ResourceExhausted` while under
    /// pressure.
    pub fn try_accept_capture(&self) -> Result<MemorySnapshot> {
        let snapshot = self.check();
        if snapshot.under_pressure {
            return Err(ScanError::ResourceExhausted {
                used_bytes: snapshot.used_bytes,
                budget_bytes: snapshot.budget_bytes,
            });
        }
        Ok(snapshot)
    }

    /// Last published pressure flag.
    pub fn under_pressure(&self) -> bool {
        *self.pressure.borrow()
    }

    /// A receiver that sees every pressure change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.pressure.subscribe()
    }
}
