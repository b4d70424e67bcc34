//! Binding manager - inserts pre-processors between pullers and the dispatcher
//!
//! A binding rewires a puller's filter so that what went to the dispatcher goes
//! to a processor instead; the processor then forwards to the puller's former
//! targets. All bindings are validated before any puller is touched.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, instrument};

use contracts::ActorName;
use ingestion::PullerActor;

use crate::error::{ActorFactoryError, Result};
use crate::processor::ProcessorActor;

pub struct PreProcessorBindingManager {
    actors: HashMap<ActorName, PullerActor>,
    processors: HashMap<ActorName, ProcessorActor>,
}

impl PreProcessorBindingManager {
    pub fn new(
        actors: HashMap<ActorName, PullerActor>,
        processors: HashMap<ActorName, ProcessorActor>,
    ) -> Self {
        Self { actors, processors }
    }

    pub fn actors(&self) -> &HashMap<ActorName, PullerActor> {
        &self.actors
    }

    pub fn processors(&self) -> &HashMap<ActorName, ProcessorActor> {
        &self.processors
    }

    /// No two processors may name the same puller
    ///
    /// # Errors
    /// `TargetActorAlreadyUsed` on the first shared puller.
    pub fn check_processors_targets_are_unique(&self) -> Result<()> {
        let mut seen: BTreeMap<&ActorName, &ActorName> = BTreeMap::new();
        for (name, processor) in self.sorted_processors() {
            if let Some(first) = seen.insert(processor.puller(), name) {
                return Err(ActorFactoryError::TargetActorAlreadyUsed {
                    puller: format!("{} (wanted by '{first}' and '{name}')", processor.puller()),
                });
            }
        }
        Ok(())
    }

    /// Whether `processor` may take over the puller it names
    ///
    /// # Errors
    /// - `UnexistingActor`: no such puller
    /// - `TargetActorAlreadyUsed`: the puller is already bound
    /// - `UnsupportedActorType`: the processor cannot receive reports from a
    ///   puller, or a filter target of the puller cannot be rebound
    pub fn check_processor_targets(&self, processor: &ProcessorActor) -> Result<()> {
        let puller = self
            .actors
            .get(processor.puller())
            .ok_or_else(|| ActorFactoryError::unexisting_actor(processor.puller().as_str()))?;

        if puller.is_bound() {
            return Err(ActorFactoryError::target_actor_already_used(
                processor.puller().as_str(),
            ));
        }

        let kind = processor.actor_ref().kind();
        if !kind.accepts_bindings() {
            return Err(ActorFactoryError::unsupported_actor_type(
                processor.actor_ref().name().as_str(),
                kind,
            ));
        }

        for (_, target) in puller.filter().entries() {
            if !target.kind().is_rebindable() {
                return Err(ActorFactoryError::unsupported_actor_type(
                    target.name().as_str(),
                    target.kind(),
                ));
            }
        }
        Ok(())
    }

    /// Validate every binding, then apply them all.
    ///
    /// On error nothing has been rebound.
    #[instrument(name = "binding_manager_process", skip(self), fields(bindings = self.processors.len()))]
    pub fn process_bindings(&mut self) -> Result<()> {
        self.check_processors_targets_are_unique()?;
        for (_, processor) in self.sorted_processors() {
            self.check_processor_targets(processor)?;
        }

        for processor in self.processors.values_mut() {
            let puller = self
                .actors
                .get_mut(processor.puller())
                .ok_or_else(|| ActorFactoryError::unexisting_actor(processor.puller().as_str()))?;
            let previous = puller.rebind(processor.actor_ref())?;
            info!(
                processor = %processor.actor_ref().name(),
                puller = %processor.puller(),
                targets = previous.len(),
                "Binding applied"
            );
            processor.set_targets(previous);
        }
        Ok(())
    }

    /// Pullers and processors, ready to launch
    pub fn into_parts(self) -> (HashMap<ActorName, PullerActor>, HashMap<ActorName, ProcessorActor>) {
        (self.actors, self.processors)
    }

    /// Deterministic iteration, so errors do not depend on hash order
    fn sorted_processors(&self) -> Vec<(&ActorName, &ProcessorActor)> {
        let mut sorted: Vec<_> = self.processors.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted
    }
}
