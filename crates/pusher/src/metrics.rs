//! Pusher metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single pusher
#[derive(Debug, Default)]
pub struct PusherMetrics {
    /// Reports persisted
    saved: AtomicU64,
    /// Reports dropped after exhausting the save policy
    failed: AtomicU64,
    /// Extra save attempts
    retried: AtomicU64,
}

impl PusherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }

    pub fn inc_saved(&self) {
        self.saved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn inc_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> PusherMetricsSnapshot {
        PusherMetricsSnapshot {
            saved: self.saved(),
            failed: self.failed(),
            retried: self.retried(),
        }
    }
}

/// Snapshot of pusher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PusherMetricsSnapshot {
    pub saved: u64,
    pub failed: u64,
    pub retried: u64,
}
