//! Pipeline metrics
//!
//! Actors keep their own atomic counters; these helpers publish cumulative
//! totals sampled from them through the `metrics` facade, and the aggregator
//! turns successive samples into throughput statistics.

use std::time::Duration;

use contracts::{ActorKind, LifecycleState};
use metrics::{counter, gauge, histogram};

/// Reports read by a puller (cumulative)
pub fn record_report_received(puller: &str, total: u64) {
    counter!("meterflow_reports_received_total", "puller" => puller.to_string()).absolute(total);
}

/// Reports routed to formulas by the dispatcher (cumulative)
pub fn record_report_routed(dispatcher: &str, total: u64) {
    counter!("meterflow_reports_routed_total", "dispatcher" => dispatcher.to_string())
        .absolute(total);
}

/// Formulas started by the dispatcher (cumulative)
pub fn record_formula_created(dispatcher: &str, total: u64) {
    counter!("meterflow_formulas_created_total", "dispatcher" => dispatcher.to_string())
        .absolute(total);
}

/// Reports persisted by a pusher, split by outcome (cumulative)
pub fn record_report_saved(pusher: &str, saved: u64, failed: u64) {
    counter!(
        "meterflow_reports_saved_total",
        "pusher" => pusher.to_string(),
        "status" => "success"
    )
    .absolute(saved);
    counter!(
        "meterflow_reports_saved_total",
        "pusher" => pusher.to_string(),
        "status" => "failure"
    )
    .absolute(failed);
}

/// Reports dropped on the way (unmatched, unroutable, after drain) (cumulative)
pub fn record_report_dropped(actor: &str, reason: &'static str, total: u64) {
    counter!(
        "meterflow_reports_dropped_total",
        "actor" => actor.to_string(),
        "reason" => reason
    )
    .absolute(total);
}

/// Lifecycle state of one actor, as its position in the lifecycle (0 = created)
pub fn record_actor_state(actor: &str, kind: ActorKind, state: LifecycleState) {
    gauge!(
        "meterflow_actor_state",
        "actor" => actor.to_string(),
        "kind" => kind.to_string()
    )
    .set(state_ordinal(state));
}

/// Throughput of the last sampling interval
pub fn record_save_rate(per_second: f64) {
    histogram!("meterflow_save_rate_per_second").record(per_second);
}

fn state_ordinal(state: LifecycleState) -> f64 {
    match state {
        LifecycleState::Created => 0.0,
        LifecycleState::Initializing => 1.0,
        LifecycleState::Running => 2.0,
        LifecycleState::Draining => 3.0,
        LifecycleState::Terminated => 4.0,
    }
}

/// Pipeline-wide totals at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSample {
    pub received: u64,
    pub routed: u64,
    pub formulas: u64,
    pub saved: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Pipeline metrics aggregator
///
/// Keeps the last sample and rate statistics in memory for the run summary.
#[derive(Debug, Clone, Default)]
pub struct PipelineMetricsAggregator {
    last: PipelineSample,
    samples: u64,
    save_rate: RunningStats,
}

impl PipelineMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample taken `elapsed` after the previous one
    pub fn update(&mut self, sample: PipelineSample, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if self.samples > 0 && secs > 0.0 {
            let saved = sample.saved.saturating_sub(self.last.saved);
            let rate = saved as f64 / secs;
            self.save_rate.push(rate);
            record_save_rate(rate);
        }
        self.last = sample;
        self.samples += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        let handled = self.last.saved + self.last.failed;
        MetricsSummary {
            totals: self.last,
            failure_rate: if handled > 0 {
                self.last.failed as f64 / handled as f64 * 100.0
            } else {
                0.0
            },
            save_rate: StatsSummary::from(&self.save_rate),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub totals: PipelineSample,
    /// Failed saves, percent of handled reports
    pub failure_rate: f64,
    /// Saved reports per second
    pub save_rate: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Summary ===")?;
        writeln!(f, "Reports received: {}", self.totals.received)?;
        writeln!(f, "Reports routed: {}", self.totals.routed)?;
        writeln!(f, "Formulas created: {}", self.totals.formulas)?;
        writeln!(
            f,
            "Reports saved: {} (failed: {}, {:.2}%)",
            self.totals.saved, self.totals.failed, self.failure_rate
        )?;
        writeln!(f, "Reports dropped: {}", self.totals.dropped)?;
        writeln!(f, "Save rate (reports/s): {}", self.save_rate)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
