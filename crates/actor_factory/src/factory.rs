//! ActorFactory - builds a running pipeline from a `PipelineBlueprint`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use contracts::{
    ActorCell, ActorKind, ActorName, FormulaKind, PipelineBlueprint, ProcessorConfig,
};
use dispatcher::{
    dummy_formula_factory, DispatcherActor, DispatcherMetrics, DispatcherMetricsSnapshot,
    DispatcherSettings, FormulaFactory,
};
use ingestion::{create_producer, PullerActor, PullerMetrics, PullerMetricsSnapshot, ReportFilter, ReportPredicate};
use pusher::{create_database, PusherActor, PusherMetrics, PusherMetricsSnapshot};

use crate::binding::PreProcessorBindingManager;
use crate::error::{ActorFactoryError, Result};
use crate::processor::{create_processor, ProcessorActor};
use crate::supervisor::Supervisor;

/// Launched pipeline
#[derive(Debug)]
pub struct Topology {
    pub supervisor: Supervisor,
    pub dispatcher: Arc<DispatcherMetrics>,
    pub pullers: Vec<(ActorName, Arc<PullerMetrics>)>,
    pub pushers: Vec<(ActorName, Arc<PusherMetrics>)>,
}

/// Point-in-time counters of a [`Topology`]
#[derive(Debug, Clone)]
pub struct TopologyStats {
    pub dispatcher: DispatcherMetricsSnapshot,
    pub pullers: Vec<(ActorName, PullerMetricsSnapshot)>,
    pub pushers: Vec<(ActorName, PusherMetricsSnapshot)>,
}

impl Topology {
    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            dispatcher: self.dispatcher.snapshot(),
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

    /// Wait for the pipeline to drain on its own (every producer exhausted)
    ///
    /// # Errors
    /// `JoinTimeout` if draining takes longer than `timeout`.
    pub async fn join(&mut self, timeout: Duration) -> Result<()> {
        self.supervisor.join(timeout).await
    }

    /// Stop the producers and drain. Actors still alive at `timeout` are killed.
    ///
    /// # Errors
    /// `JoinTimeout` naming the actors that had to be killed.
    #[instrument(name = "topology_shutdown", skip(self), fields(pipeline = %self.supervisor.name()))]
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        self.supervisor.stop_sources().await;
        let outcome = self.supervisor.join(timeout).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "Graceful shutdown incomplete, killing remaining actors");
            self.supervisor.kill_all();
        }
        outcome
    }
}

/// Actor Factory
///
/// Launch order follows the data flow backwards: pushers, dispatcher,
/// processors, pullers. A failure at any step kills what was launched.
pub struct ActorFactory;

impl ActorFactory {
    /// Formula factory for the blueprint's formula section
    pub fn formula_factory(blueprint: &PipelineBlueprint) -> impl FormulaFactory + 'static {
        match blueprint.formula.kind {
            FormulaKind::Dummy => dummy_formula_factory(blueprint.formula.power),
        }
    }

    /// Launch a pipeline whose formulas come from `formulas`
    /// (see [`ActorFactory::formula_factory`] for the configured one)
    ///
    /// # Errors
    /// Any build, binding or launch error. Nothing stays running on error.
    #[instrument(
        name = "actor_factory_spawn_blueprint",
        skip(blueprint, formulas),
        fields(
            pipeline = %blueprint.pipeline.name,
            inputs = blueprint.inputs.len(),
            outputs = blueprint.outputs.len(),
            processors = blueprint.processors.len()
        )
    )]
    pub async fn spawn_from_blueprint(
        blueprint: &PipelineBlueprint,
        formulas: impl FormulaFactory + 'static,
    ) -> Result<Topology> {
        let mut supervisor = Supervisor::new(
            blueprint.pipeline.name.as_str(),
            blueprint.pipeline.mailbox_capacity,
        );

        match Self::launch_all(blueprint, formulas, &mut supervisor).await {
            Ok((dispatcher, pullers, pushers)) => {
                info!(actors = supervisor.registry().len(), "Pipeline launched");
                Ok(Topology {
                    supervisor,
                    dispatcher,
                    pullers,
                    pushers,
                })
            }
            Err(e) => {
                warn!(error = %e, "Launch failed, rolling back all actors");
                supervisor.kill_all();
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    async fn launch_all(
        blueprint: &PipelineBlueprint,
        formulas: impl FormulaFactory + 'static,
        supervisor: &mut Supervisor,
    ) -> Result<(
        Arc<DispatcherMetrics>,
        Vec<(ActorName, Arc<PullerMetrics>)>,
        Vec<(ActorName, Arc<PusherMetrics>)>,
    )> {
        let capacity = blueprint.pipeline.mailbox_capacity;

        let mut pusher_metrics = Vec::with_capacity(blueprint.outputs.len());
        for output in &blueprint.outputs {
            let database = create_database(output)?;
            let pusher = PusherActor::new(output.name.as_str(), database, output.model)
                .with_policy(output.on_save_error);
            pusher_metrics.push((ActorName::from(output.name.as_str()), pusher.metrics()));
            supervisor.launch(pusher, capacity).await?;
        }

        let settings = DispatcherSettings::from_blueprint(blueprint)?;
        let dispatcher = DispatcherActor::new(settings, supervisor.registry().clone(), formulas);
        let dispatcher_metrics = dispatcher.metrics();
        let dispatcher_ref = supervisor.launch(dispatcher, capacity).await?;

        let mut processor_cells = HashMap::new();
        let mut processors = HashMap::new();
        for config in &blueprint.processors {
            let (cell, actor) = Self::build_processor(config, capacity)?;
            processor_cells.insert(cell.name().clone(), cell);
            processors.insert(ActorName::from(config.name.as_str()), actor);
        }

        let mut pullers = HashMap::new();
        let mut puller_metrics = Vec::with_capacity(blueprint.inputs.len());
        for input in &blueprint.inputs {
            let producer = create_producer(input)?;
            let filter = ReportFilter::new()
                .filter(ReportPredicate::kind(input.model), dispatcher_ref.clone());
            let puller = PullerActor::new(input.name.as_str(), producer, filter);
            puller_metrics.push((ActorName::from(input.name.as_str()), puller.metrics()));
            pullers.insert(ActorName::from(input.name.as_str()), puller);
        }

        let mut bindings = PreProcessorBindingManager::new(pullers, processors);
        bindings.process_bindings()?;
        let (mut pullers, mut processors) = bindings.into_parts();

        for config in &blueprint.processors {
            let name = ActorName::from(config.name.as_str());
            let (Some(actor), Some(cell)) = (processors.remove(&name), processor_cells.remove(&name)) else {
                return Err(ActorFactoryError::unexisting_actor(config.name.as_str()));
            };
            supervisor.launch_in(actor, cell).await?;
        }

        for input in &blueprint.inputs {
            let puller = pullers
                .remove(input.name.as_str())
                .ok_or_else(|| ActorFactoryError::unexisting_actor(input.name.as_str()))?;
            supervisor.launch(puller, capacity).await?;
        }

        Ok((dispatcher_metrics, puller_metrics, pusher_metrics))
    }

    fn build_processor(
        config: &ProcessorConfig,
        capacity: usize,
    ) -> Result<(ActorCell, ProcessorActor)> {
        let processor = create_processor(config)?;
        let cell = ActorCell::new(config.name.as_str(), ActorKind::Processor, capacity);
        let actor = ProcessorActor::new(config.puller.as_str(), processor, cell.actor_ref());
        Ok((cell, actor))
    }
}
