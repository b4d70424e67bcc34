//! Run statistics, bridged from actor counters to the metrics facade

use std::sync::Arc;
use std::time::{Duration, Instant};

use actor_factory::{Supervisor, Topology, TopologyStats};
use contracts::ActorName;
use dispatcher::DispatcherMetrics;
use ingestion::PullerMetrics;
use observability::{PipelineMetricsAggregator, PipelineSample};
use pusher::PusherMetrics;

/// Samples the counters of a running topology
///
/// Holds its own handles on the metrics, so it can run while the supervisor
/// is busy joining.
pub struct StatsBridge {
    dispatcher: String,
    dispatcher_metrics: Arc<DispatcherMetrics>,
    pullers: Vec<(ActorName, Arc<PullerMetrics>)>,
    pushers: Vec<(ActorName, Arc<PusherMetrics>)>,
    last_sample: Instant,
}

impl StatsBridge {
    pub fn new(topology: &Topology, dispatcher: &str) -> Self {
        Self {
            dispatcher: dispatcher.to_string(),
            dispatcher_metrics: Arc::clone(&topology.dispatcher),
            pullers: topology.pullers.clone(),
            pushers: topology.pushers.clone(),
            last_sample: Instant::now(),
        }
    }

    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            dispatcher: self.dispatcher_metrics.snapshot(),
            pullers: self
                .pullers
                .iter()
                .map(|(name, m)| (name.clone(), m.snapshot()))
                .collect(),
            pushers: self
                .pushers
                .iter()
                .map(|(name, m)| (name.clone(), m.snapshot()))
                .collect(),
        }
    }

    /// Publish every counter and feed the aggregator
    pub fn publish(&mut self, aggregator: &mut PipelineMetricsAggregator) {
        let stats = self.stats();

        for (name, puller) in &stats.pullers {
            observability::record_report_received(name.as_str(), puller.received);
            observability::record_report_dropped(name.as_str(), "unmatched", puller.unmatched);
        }
        observability::record_report_routed(&self.dispatcher, stats.dispatcher.reports_routed);
        observability::record_formula_created(&self.dispatcher, stats.dispatcher.formulas_created);
        observability::record_report_dropped(
            &self.dispatcher,
            "unroutable",
            stats.dispatcher.routing_failures,
        );
        observability::record_report_dropped(
            &self.dispatcher,
            "draining",
            stats.dispatcher.reports_dropped,
        );
        for (name, pusher) in &stats.pushers {
            observability::record_report_saved(name.as_str(), pusher.saved, pusher.failed);
        }

        let now = Instant::now();
        aggregator.update(sample(&stats), now - self.last_sample);
        self.last_sample = now;
    }

    /// Lifecycle gauges, once the supervisor is free again
    pub fn publish_states(&self, supervisor: &Supervisor) {
        for (name, kind, state) in supervisor.states() {
            observability::record_actor_state(name.as_str(), kind, state);
        }
    }
}

/// Pipeline-wide totals
pub fn sample(stats: &TopologyStats) -> PipelineSample {
    PipelineSample {
        received: stats.pullers.iter().map(|(_, p)| p.received).sum(),
        routed: stats.dispatcher.reports_routed,
        formulas: stats.dispatcher.formulas_created,
        saved: stats.pushers.iter().map(|(_, p)| p.saved).sum(),
        failed: stats.pushers.iter().map(|(_, p)| p.failed).sum(),
        dropped: stats.pullers.iter().map(|(_, p)| p.unmatched).sum::<u64>()
            + stats.dispatcher.routing_failures
            + stats.dispatcher.reports_dropped,
    }
}

/// Statistics from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub duration: Duration,
    /// Stopped by a signal or the run timeout rather than source exhaustion
    pub interrupted: bool,
    pub actors: usize,
    pub topology: TopologyStats,
    pub metrics: PipelineMetricsAggregator,
}

impl PipelineStats {
    /// Saved reports per second over the whole run
    pub fn throughput(&self) -> f64 {
        let saved: u64 = self.topology.pushers.iter().map(|(_, p)| p.saved).sum();
        if self.duration.as_secs_f64() > 0.0 {
            saved as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Actors: {}", self.actors);
        println!("   ├─ Throughput: {:.2} reports/s", self.throughput());
        println!(
            "   └─ Ended by: {}",
            if self.interrupted { "shutdown request" } else { "source exhaustion" }
        );

        println!("\n📥 Inputs");
        for (name, puller) in &self.topology.pullers {
            println!(
                "   ├─ {name}: received {}, forwarded {}, unmatched {}",
                puller.received, puller.forwarded, puller.unmatched
            );
        }

        println!("\n📤 Outputs");
        for (name, pusher) in &self.topology.pushers {
            println!(
                "   ├─ {name}: saved {}, failed {}, retried {}",
                pusher.saved, pusher.failed, pusher.retried
            );
        }

        println!("\n{}", self.metrics.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::DispatcherMetricsSnapshot;
    use ingestion::PullerMetricsSnapshot;
    use pusher::PusherMetricsSnapshot;

    #[test]
    fn sample_sums_every_actor() {
        let stats = TopologyStats {
            dispatcher: DispatcherMetricsSnapshot {
                reports_routed: 10,
                formulas_created: 2,
                routing_failures: 1,
                reports_dropped: 2,
            },
            pullers: vec![
                (
                    "a".into(),
                    PullerMetricsSnapshot {
                        received: 6,
                        forwarded: 5,
                        unmatched: 1,
                    },
                ),
                (
                    "b".into(),
                    PullerMetricsSnapshot {
                        received: 8,
                        forwarded: 8,
                        unmatched: 0,
                    },
                ),
            ],
            pushers: vec![(
                "out".into(),
                PusherMetricsSnapshot {
                    saved: 9,
                    failed: 1,
                    retried: 0,
                },
            )],
        };

        let sample = sample(&stats);
        assert_eq!(sample.received, 14);
        assert_eq!(sample.saved, 9);
        assert_eq!(sample.dropped, 4);
    }
}
