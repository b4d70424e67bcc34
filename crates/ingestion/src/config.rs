//! Puller metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Puller metrics
#[derive(Debug, Default)]
pub struct PullerMetrics {
    /// Reports read from the producer
    pub received: AtomicU64,

    /// Reports handed to a filter target
    pub forwarded: AtomicU64,

    /// Reports no filter entry matched
    pub unmatched: AtomicU64,
}

impl PullerMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> PullerMetricsSnapshot {
        PullerMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullerMetricsSnapshot {
    pub received: u64,
    pub forwarded: u64,
    pub unmatched: u64,
}
