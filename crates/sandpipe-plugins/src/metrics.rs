//! Per-instance `process_message` counters.
//!
//! Counters are atomics so a reporting collaborator can read them through a
//! shared handle while the driver loop is running.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one plugin instance.
#[derive(Debug, Default)]
pub struct ProcessMetrics {
    count: AtomicU64,
    failures: AtomicU64,
    samples: AtomicU64,
    duration_ns: AtomicU64,
}

impl ProcessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `process_message` attempts.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Number of recoverable failures.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of attempts included in `duration`.
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Cumulative elapsed time of sampled attempts.
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.duration_ns.load(Ordering::Relaxed))
    }

    /// Count one attempt and return the new total.
    pub(crate) fn record_attempt(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sample(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.duration_ns.fetch_add(ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            count: self.count(),
            failures: self.failures(),
            samples: self.samples(),
            duration_ns: self.duration_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProcessMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub failures: u64,
    pub samples: u64,
    pub duration_ns: u64,
}

impl MetricsSnapshot {
    /// Mean duration of sampled attempts in nanoseconds.
    pub fn avg_duration_ns(&self) -> u64 {
        match self.samples {
            0 => 0,
            n => self.duration_ns / n,
        }
    }
}
