//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the dispatcher task and its observers
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    /// Reports forwarded to a formula
    reports_routed: AtomicU64,
    /// Formulas instantiated
    formulas_created: AtomicU64,
    /// Reports without a rule or with a missing identity field
    routing_failures: AtomicU64,
    /// Reports dropped while draining or because a formula was gone
    reports_dropped: AtomicU64,
}

impl DispatcherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports_routed(&self) -> u64 {
        self.reports_routed.load(Ordering::Relaxed)
    }

    pub fn inc_reports_routed(&self) {
        self.reports_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn formulas_created(&self) -> u64 {
        self.formulas_created.load(Ordering::Relaxed)
    }

    pub fn inc_formulas_created(&self) {
        self.formulas_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routing_failures(&self) -> u64 {
        self.routing_failures.load(Ordering::Relaxed)
    }

    pub fn inc_routing_failures(&self) {
        self.routing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reports_dropped(&self) -> u64 {
        self.reports_dropped.load(Ordering::Relaxed)
    }

    pub fn inc_reports_dropped(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DispatcherMetricsSnapshot {
        DispatcherMetricsSnapshot {
            reports_routed: self.reports_routed(),
            formulas_created: self.formulas_created(),
            routing_failures: self.routing_failures(),
            reports_dropped: self.reports_dropped(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherMetricsSnapshot {
    pub reports_routed: u64,
    pub formulas_created: u64,
    pub routing_failures: u64,
    pub reports_dropped: u64,
}
