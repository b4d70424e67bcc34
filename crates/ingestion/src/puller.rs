//! Puller actor - reads a producer and forwards reports through its filter

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use contracts::{
    Actor, ActorContext, ActorKind, ActorName, ActorRef, ContractError, EndMessage, Flow, Report,
    ReportProducer,
};

use crate::config::PullerMetrics;
use crate::error::{IngestionError, Result};
use crate::filter::ReportFilter;

/// Source actor
///
/// Producer reads happen on a dedicated task that feeds the puller's own mailbox,
/// so a slow producer never blocks message handling. End of stream (or a read
/// error) from the producer arrives as an end-of-stream sent by the puller to
/// itself.
pub struct PullerActor {
    name: ActorName,
    producer: Option<Box<dyn ReportProducer>>,
    filter: ReportFilter,
    bound: bool,
    reader: Option<JoinHandle<()>>,
    metrics: Arc<PullerMetrics>,
}

impl PullerActor {
    pub fn new(
        name: impl Into<ActorName>,
        producer: Box<dyn ReportProducer>,
        filter: ReportFilter,
    ) -> Self {
        Self {
            name: name.into(),
            producer: Some(producer),
            filter,
            bound: false,
            reader: None,
            metrics: Arc::new(PullerMetrics::new()),
        }
    }

    pub fn filter(&self) -> &ReportFilter {
        &self.filter
    }

    pub fn metrics(&self) -> Arc<PullerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Redirect every rebindable filter entry to `processor`. Allowed once.
    ///
    /// Returns the targets the filter pointed at before.
    ///
    /// # Errors
    /// `AlreadyBound` on a second call.
    pub fn rebind(&mut self, processor: &ActorRef) -> Result<Vec<ActorRef>> {
        if self.bound {
            return Err(IngestionError::AlreadyBound {
                puller: self.name.to_string(),
            });
        }
        let previous = self.filter.retarget(processor);
        self.bound = true;
        info!(puller = %self.name, processor = %processor.name(), "Puller rebound");
        Ok(previous)
    }

    fn stop_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Pump producer reads into the puller mailbox
async fn read_loop(mut producer: Box<dyn ReportProducer>, myself: ActorRef) {
    loop {
        match producer.read().await {
            Ok(Some(report)) => {
                if !myself.send_report(report).await {
                    return;
                }
            }
            Ok(None) => {
                debug!(puller = %myself.name(), producer = producer.name(), "Producer exhausted");
                break;
            }
            Err(e) => {
                warn!(puller = %myself.name(), producer = producer.name(), error = %e, "Producer read failed, ending stream");
                break;
            }
        }
    }
    myself.send_end(myself.name()).await;
}

impl Actor for PullerActor {
    fn name(&self) -> &ActorName {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Puller
    }

    #[instrument(name = "puller_initialize", skip(self, ctx), fields(puller = %self.name))]
    async fn initialize(&mut self, ctx: &ActorContext) -> std::result::Result<(), ContractError> {
        if self.filter.is_empty() {
            return Err(ContractError::initialization(self.name.as_str(), "report filter is empty"));
        }
        let mut producer = self.producer.take().ok_or_else(|| {
            ContractError::initialization(self.name.as_str(), "producer already consumed")
        })?;
        producer
            .connect()
            .await
            .map_err(|e| ContractError::initialization(self.name.as_str(), e.to_string()))?;

        info!(producer = producer.name(), targets = self.filter.targets().len(), "Puller connected");
        self.reader = Some(tokio::spawn(read_loop(producer, ctx.myself().clone())));
        Ok(())
    }

    async fn on_report(&mut self, report: Report, _ctx: &ActorContext) -> Flow {
        self.metrics.record_received();
        match self.filter.route(&report) {
            Some(target) => {
                if target.send_report(report).await {
                    self.metrics.record_forwarded();
                }
            }
            None => {
                self.metrics.record_unmatched();
                trace!(puller = %self.name, kind = %report.kind(), "No filter entry matched");
            }
        }
        Flow::Continue
    }

    async fn on_end(&mut self, end: EndMessage, _ctx: &ActorContext) -> Flow {
        self.stop_reader();
        let targets = self.filter.targets();
        for target in &targets {
            target.send_end(&self.name).await;
        }
        info!(
            puller = %self.name,
            from = %end.sender,
            targets = targets.len(),
            "End-of-stream forwarded"
        );
        Flow::Stop
    }

    async fn on_drain_timeout(&mut self, _ctx: &ActorContext) -> Flow {
        Flow::Stop
    }

    async fn on_terminate(&mut self, _ctx: &ActorContext) {
        self.stop_reader();
        let snapshot = self.metrics.snapshot();
        debug!(
            puller = %self.name,
            received = snapshot.received,
            forwarded = snapshot.forwarded,
            unmatched = snapshot.unmatched,
            "Puller terminated"
        );
    }
}
