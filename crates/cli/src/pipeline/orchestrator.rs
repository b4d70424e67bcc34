//! Pipeline orchestrator - launches the topology and drives it to completion.

use std::future::Future;
use std::time::{Duration, Instant};

use actor_factory::{ActorFactory, ActorFactoryError};
use anyhow::{Context, Result};
use contracts::PipelineBlueprint;
use observability::PipelineMetricsAggregator;
use tracing::{info, warn};

use super::{PipelineStats, StatsBridge};
use crate::error::CliError;

/// Bound used when no run timeout is given
const UNBOUNDED: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Extra time granted on top of the drain timeout when stopping on request
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub blueprint: PipelineBlueprint,

    /// Stop the sources after this long (None = run until exhausted)
    pub timeout: Option<Duration>,

    pub stats_interval: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

pub struct Pipeline {
    config: PipelineConfig,
}

enum Completion {
    Drained(actor_factory::Result<()>),
    Interrupted,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until every source is exhausted, or until `shutdown` resolves or the
    /// timeout expires, in which case the sources are stopped and the pipeline
    /// drained.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let mut topology = ActorFactory::spawn_from_blueprint(
            blueprint,
            ActorFactory::formula_factory(blueprint),
        )
        .await
        .context("Failed to launch pipeline")?;

        let mut bridge = StatsBridge::new(&topology, &blueprint.dispatcher.name);
        let mut aggregator = PipelineMetricsAggregator::new();
        bridge.publish(&mut aggregator);

        info!(
            actors = topology.supervisor.registry().len(),
            "Pipeline running"
        );

        let run_limit = self.config.timeout.unwrap_or(UNBOUNDED);
        let completion = {
            let join = topology.supervisor.join(UNBOUNDED);
            let limit = tokio::time::sleep(run_limit);
            let mut ticker = tokio::time::interval(self.config.stats_interval);
            tokio::pin!(join, limit, shutdown);

            loop {
                tokio::select! {
                    result = &mut join => break Completion::Drained(result),
                    _ = &mut shutdown => {
                        warn!("Received shutdown signal, stopping sources...");
                        break Completion::Interrupted;
                    }
                    _ = &mut limit => {
                        warn!(timeout_secs = run_limit.as_secs(), "Run timeout reached, stopping sources...");
                        break Completion::Interrupted;
                    }
                    _ = ticker.tick() => bridge.publish(&mut aggregator),
                }
            }
        };

        let interrupted = match completion {
            Completion::Drained(result) => {
                result.context("Pipeline failed while draining")?;
                false
            }
            Completion::Interrupted => {
                let grace = blueprint.pipeline.drain_timeout() + SHUTDOWN_GRACE;
                if let Err(e) = topology.shutdown(grace).await {
                    return Err(match e {
                        ActorFactoryError::JoinTimeout { pending } => {
                            CliError::shutdown(format!("still running: {}", pending.join(", "))).into()
                        }
                        other => anyhow::Error::new(other),
                    });
                }
                true
            }
        };

        bridge.publish(&mut aggregator);
        bridge.publish_states(&topology.supervisor);

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            interrupted,
            actors: topology.supervisor.registry().len(),
            topology: bridge.stats(),
            metrics: aggregator,
        })
    }
}
