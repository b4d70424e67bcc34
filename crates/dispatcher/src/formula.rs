//! Formula - per routing key worker
//!
//! The dispatcher only relies on the lifecycle contract: a formula is built by a
//! [`FormulaFactory`], accepts reports, sends results to its pushers and, on
//! end-of-stream, acknowledges to the dispatcher before terminating. The
//! computation itself is behind the [`Formula`] trait.

use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};

use contracts::{
    spawn_actor, Actor, ActorCell, ActorContext, ActorHandle, ActorKind, ActorName, ActorRef,
    ContractError, EndMessage, Flow, Report, ReportPayload,
};

use crate::route::RoutingKey;

/// Everything a factory needs to start one formula
#[derive(Debug, Clone)]
pub struct FormulaContext {
    /// Unique formula name (`<dispatcher>-formula-<key>`)
    pub name: ActorName,
    pub key: RoutingKey,
    /// Result destinations, de-duplicated
    pub pushers: Vec<ActorRef>,
    /// Parent, receives the end-of-stream acknowledgment
    pub dispatcher: ActorRef,
    pub mailbox_capacity: usize,
}

impl FormulaContext {
    pub fn new(
        name: impl Into<ActorName>,
        key: RoutingKey,
        pushers: impl IntoIterator<Item = ActorRef>,
        dispatcher: ActorRef,
        mailbox_capacity: usize,
    ) -> Self {
        let unique: BTreeMap<ActorName, ActorRef> = pushers
            .into_iter()
            .map(|p| (p.name().clone(), p))
            .collect();
        Self {
            name: name.into(),
            key,
            pushers: unique.into_values().collect(),
            dispatcher,
            mailbox_capacity,
        }
    }
}

/// Builds the formula for a routing key seen for the first time
pub trait FormulaFactory: Send {
    fn create(&mut self, key: &RoutingKey, ctx: FormulaContext) -> ActorHandle;
}

impl<F> FormulaFactory for F
where
    F: FnMut(&RoutingKey, FormulaContext) -> ActorHandle + Send,
{
    fn create(&mut self, key: &RoutingKey, ctx: FormulaContext) -> ActorHandle {
        self(key, ctx)
    }
}

/// Computation run by a [`FormulaActor`]
#[trait_variant::make(Formula: Send)]
pub trait LocalFormula {
    fn name(&self) -> &str;

    /// Zero or more result reports for one input report
    async fn compute(&mut self, report: &Report) -> Result<Vec<Report>, ContractError>;
}

/// Actor wrapping a [`Formula`]
pub struct FormulaActor<F> {
    name: ActorName,
    key: RoutingKey,
    formula: F,
    pushers: Vec<ActorRef>,
    processed: u64,
}

impl<F: Formula + 'static> FormulaActor<F> {
    pub fn new(formula: F, ctx: &FormulaContext) -> Self {
        Self {
            name: ctx.name.clone(),
            key: ctx.key.clone(),
            formula,
            pushers: ctx.pushers.clone(),
            processed: 0,
        }
    }

    /// Spawn `formula` as a child of `ctx.dispatcher`
    pub fn spawn(formula: F, ctx: FormulaContext) -> ActorHandle {
        let actor = Self::new(formula, &ctx);
        let cell = ActorCell::new(ctx.name, ActorKind::Formula, ctx.mailbox_capacity);
        spawn_actor(actor, cell, Some(ctx.dispatcher))
    }
}

impl<F: Formula> Actor for FormulaActor<F> {
    fn name(&self) -> &ActorName {
        &self.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Formula
    }

    async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ContractError> {
        debug!(formula = %self.name, key = %self.key, "Formula started");
        Ok(())
    }

    async fn on_report(&mut self, report: Report, _ctx: &ActorContext) -> Flow {
        self.processed += 1;
        match self.formula.compute(&report).await {
            Ok(results) => {
                for result in results {
                    for pusher in &self.pushers {
                        pusher.send_report(result.clone()).await;
                    }
                }
            }
            Err(e) => {
                warn!(formula = %self.name, key = %self.key, error = %e, "Formula computation failed");
            }
        }
        Flow::Continue
    }

    #[instrument(name = "formula_end", skip(self, end, ctx), fields(formula = %self.name))]
    async fn on_end(&mut self, end: EndMessage, ctx: &ActorContext) -> Flow {
        debug!(from = %end.sender, processed = self.processed, "Formula acknowledging end-of-stream");
        ctx.notify_parent_end().await;
        Flow::Stop
    }

    async fn on_drain_timeout(&mut self, _ctx: &ActorContext) -> Flow {
        Flow::Stop
    }

    async fn on_terminate(&mut self, _ctx: &ActorContext) {}
}

/// Constant-power formula, keeps the identity of its input
#[derive(Debug, Clone)]
pub struct DummyFormula {
    power: f64,
}

impl DummyFormula {
    pub fn new(power: f64) -> Self {
        Self { power }
    }
}

impl Formula for DummyFormula {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn compute(&mut self, report: &Report) -> Result<Vec<Report>, ContractError> {
        let mut result = report.clone();
        result.payload = ReportPayload::Power { power: self.power };
        Ok(vec![result])
    }
}

/// Factory spawning one [`DummyFormula`] per routing key
pub fn dummy_formula_factory(power: f64) -> impl FormulaFactory {
    move |_key: &RoutingKey, ctx: FormulaContext| FormulaActor::spawn(DummyFormula::new(power), ctx)
}
