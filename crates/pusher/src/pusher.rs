//! PusherActor - persists reports through a database

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use contracts::{
    Actor, ActorContext, ActorKind, ActorName, ContractError, EndMessage, Flow, Report,
    ReportDatabase, ReportModel, SaveFailurePolicy,
};

use crate::metrics::PusherMetrics;

/// Sink actor
///
/// Save failures never crash the actor unless the policy is `Stop`.
pub struct PusherActor<D> {
    name: ActorName,
    database: D,
    model: ReportModel,
    policy: SaveFailurePolicy,
    connected: bool,
    metrics: Arc<PusherMetrics>,
}

impl<D: ReportDatabase> PusherActor<D> {
    pub fn new(name: impl Into<ActorName>, database: D, model: ReportModel) -> Self {
        Self {
            name: name.into(),
            database,
            model,
            policy: SaveFailurePolicy::default(),
            connected: false,
            metrics: Arc::new(PusherMetrics::new()),
        }
    }

    pub fn with_policy(mut self, policy: SaveFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn metrics(&self) -> Arc<PusherMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Save with the retry budget of the policy, returning the last error
    async fn save(&mut self, report: &Report) -> Result<(), ContractError> {
        let retries = match self.policy {
            SaveFailurePolicy::Retry { attempts } => attempts,
            _ => 0,
        };

        let mut attempt = 0;
        loop {
            match self.database.save(report, self.model).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    self.metrics.inc_retried();
                    warn!(pusher = %self.name, attempt, error = %e, "Save failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<D: ReportDatabase> Actor for PusherActor<D> {
    fn name(&self) -> &ActorName {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Pusher
    }

    #[instrument(name = "pusher_initialize", skip(self, _ctx), fields(pusher = %self.name, database = self.database.name()))]
    async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ContractError> {
        self.database
            .connect()
            .await
            .map_err(|e| ContractError::initialization(self.name.as_str(), e.to_string()))?;
        self.connected = true;
        info!(model = ?self.model, policy = ?self.policy, "Pusher connected");
        Ok(())
    }

    async fn on_report(&mut self, report: Report, ctx: &ActorContext) -> Flow {
        match self.save(&report).await {
            Ok(()) => {
                self.metrics.inc_saved();
                Flow::Continue
            }
            Err(e) => {
                self.metrics.inc_failed();
                error!(
                    pusher = %self.name,
                    sensor = %report.sensor,
                    target = %report.target,
                    error = %e,
                    "Report dropped after save failure"
                );
                if self.policy == SaveFailurePolicy::Stop {
                    warn!(pusher = %self.name, "Stopping on save failure");
                    ctx.notify_parent_end().await;
                    return Flow::Stop;
                }
                Flow::Continue
            }
        }
    }

    async fn on_end(&mut self, end: EndMessage, ctx: &ActorContext) -> Flow {
        info!(
            pusher = %self.name,
            from = %end.sender,
            saved = self.metrics.saved(),
            failed = self.metrics.failed(),
            "End-of-stream received"
        );
        ctx.notify_parent_end().await;
        Flow::Stop
    }

    async fn on_drain_timeout(&mut self, _ctx: &ActorContext) -> Flow {
        Flow::Stop
    }

    async fn on_terminate(&mut self, _ctx: &ActorContext) {
        if !self.connected {
            return;
        }
        if let Err(e) = self.database.flush().await {
            error!(pusher = %self.name, error = %e, "Flush failed on shutdown");
        }
        if let Err(e) = self.database.close().await {
            error!(pusher = %self.name, error = %e, "Close failed on shutdown");
        }
        debug!(pusher = %self.name, "Pusher stopped");
    }
}
