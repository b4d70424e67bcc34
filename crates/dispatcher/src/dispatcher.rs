//! Dispatcher actor - routes reports to per-key formulas
//!
//! The formula registry is only touched from the dispatcher's own task, so the
//! lookup-or-create step for a routing key needs no locking.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use contracts::{
    Actor, ActorContext, ActorHandle, ActorKind, ActorName, ActorRef, ActorRegistry,
    ContractError, EndMessage, Flow, PipelineBlueprint, Report, ReportKind,
    DEFAULT_MAILBOX_CAPACITY,
};

use crate::error::DispatcherError;
use crate::formula::{FormulaContext, FormulaFactory};
use crate::metrics::DispatcherMetrics;
use crate::route::{DispatchRule, RouteTable, RoutingKey};

/// Default time the dispatcher waits for formula acknowledgments
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub name: ActorName,
    pub route_table: RouteTable,
    /// Pushers receiving formula results
    pub pushers: Vec<ActorName>,
    /// Upstream end-of-stream signals expected before draining starts
    pub upstream_count: usize,
    pub drain_timeout: Duration,
    pub formula_mailbox_capacity: usize,
}

impl DispatcherSettings {
    pub fn new(name: impl Into<ActorName>, route_table: RouteTable) -> Self {
        Self {
            name: name.into(),
            route_table,
            pushers: Vec::new(),
            upstream_count: 1,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            formula_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }

    pub fn with_pushers<I, N>(mut self, pushers: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<ActorName>,
    {
        self.pushers = pushers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_upstream_count(mut self, count: usize) -> Self {
        self.upstream_count = count.max(1);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Settings for the blueprint's dispatcher: one primary HWPC rule at the
    /// configured depth, one upstream per input.
    ///
    /// # Errors
    /// Propagates route table registration errors.
    pub fn from_blueprint(blueprint: &PipelineBlueprint) -> Result<Self, DispatcherError> {
        let table = RouteTable::new().with_rule(
            ReportKind::Hwpc,
            DispatchRule::hwpc(blueprint.dispatcher.depth, true),
        )?;
        let mut settings = Self::new(blueprint.dispatcher.name.as_str(), table)
            .with_pushers(blueprint.dispatcher.pushers.iter())
            .with_upstream_count(blueprint.inputs.len())
            .with_drain_timeout(blueprint.pipeline.drain_timeout());
        settings.formula_mailbox_capacity = blueprint.pipeline.mailbox_capacity;
        Ok(settings)
    }
}

/// Drain progress
#[derive(Debug, Default)]
struct Drain {
    /// Formulas that have not acknowledged yet
    pending: HashSet<ActorName>,
    deadline: Option<Instant>,
}

/// Routing actor owning the formula population
pub struct DispatcherActor {
    settings: DispatcherSettings,
    registry: ActorRegistry,
    factory: Box<dyn FormulaFactory>,
    /// Resolved at initialization, de-duplicated
    pushers: Vec<ActorRef>,
    formulas: HashMap<RoutingKey, ActorHandle>,
    upstream_ends: usize,
    drain: Option<Drain>,
    metrics: Arc<DispatcherMetrics>,
    /// Set once `on_terminate` ran
    terminated: bool,
}

impl DispatcherActor {
    /// `registry` must contain the configured pushers by the time the actor starts
    pub fn new(
        settings: DispatcherSettings,
        registry: ActorRegistry,
        factory: impl FormulaFactory + 'static,
    ) -> Self {
        Self {
            settings,
            registry,
            factory: Box::new(factory),
            pushers: Vec::new(),
            formulas: HashMap::new(),
            upstream_ends: 0,
            drain: None,
            metrics: Arc::new(DispatcherMetrics::new()),
            terminated: false,
        }
    }

    /// Shared metrics, usable after the actor is spawned
    pub fn metrics(&self) -> Arc<DispatcherMetrics> {
        Arc::clone(&self.metrics)
    }

    fn check_configuration(&mut self) -> Result<(), DispatcherError> {
        let table = &self.settings.route_table;
        if table.is_empty() {
            return Err(DispatcherError::EmptyRouteTable);
        }
        if table.primary().is_none() {
            return Err(DispatcherError::NoPrimaryRule);
        }

        let mut resolved = BTreeMap::new();
        for name in &self.settings.pushers {
            match self.registry.get(name) {
                Some(actor_ref) if actor_ref.kind() == ActorKind::Pusher => {
                    resolved.insert(name.clone(), actor_ref.clone());
                }
                _ => {
                    return Err(DispatcherError::UnresolvedPusher {
                        name: name.to_string(),
                    })
                }
            }
        }
        self.pushers = resolved.into_values().collect();
        Ok(())
    }

    /// Forward to the formula owning `key`, creating it on first sight
    async fn route(&mut self, key: RoutingKey, report: Report, ctx: &ActorContext) {
        let handle = match self.formulas.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let formula_ctx = FormulaContext::new(
                    format!("{}-formula-{}", self.settings.name, key),
                    key.clone(),
                    self.pushers.iter().cloned(),
                    ctx.myself().clone(),
                    self.settings.formula_mailbox_capacity,
                );
                let handle = self.factory.create(&key, formula_ctx);
                self.metrics.inc_formulas_created();
                info!(dispatcher = %self.settings.name, %key, formula = %handle.name(), "Formula created");
                entry.insert(handle)
            }
        };

        if handle.actor_ref().send_report(report).await {
            self.metrics.inc_reports_routed();
        } else {
            self.metrics.inc_reports_dropped();
        }
    }

    /// Broadcast end-of-stream to every formula and wait for their acknowledgments
    #[instrument(name = "dispatcher_begin_drain", skip(self, ctx), fields(dispatcher = %self.settings.name, formulas = self.formulas.len()))]
    async fn begin_drain(&mut self, ctx: &ActorContext) -> Flow {
        let mut pending = HashSet::new();
        for handle in self.formulas.values() {
            if handle.actor_ref().send_end(ctx.myself().name()).await {
                pending.insert(handle.name().clone());
            }
        }

        if pending.is_empty() {
            return self.finish(ctx).await;
        }

        self.drain = Some(Drain {
            pending,
            deadline: Some(Instant::now() + self.settings.drain_timeout),
        });
        Flow::Drain
    }

    /// One end-of-stream per distinct pusher, then stop
    async fn finish(&mut self, ctx: &ActorContext) -> Flow {
        for pusher in &self.pushers {
            pusher.send_end(ctx.myself().name()).await;
        }
        if let Some(drain) = self.drain.as_mut() {
            drain.deadline = None;
        }
        info!(
            dispatcher = %self.settings.name,
            pushers = self.pushers.len(),
            "End-of-stream forwarded to pushers"
        );
        Flow::Stop
    }
}

impl Actor for DispatcherActor {
    fn name(&self) -> &ActorName {
        &self.settings.name
    }

    fn kind(&self) -> ActorKind {
        ActorKind::Dispatcher
    }

    #[instrument(name = "dispatcher_initialize", skip(self, _ctx), fields(dispatcher = %self.settings.name))]
    async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ContractError> {
        self.check_configuration()
            .map_err(|e| ContractError::initialization(self.settings.name.as_str(), e.to_string()))?;
        info!(
            rules = self.settings.route_table.len(),
            pushers = self.pushers.len(),
            "Dispatcher started"
        );
        Ok(())
    }

    async fn on_report(&mut self, report: Report, ctx: &ActorContext) -> Flow {
        if self.drain.is_some() {
            self.metrics.inc_reports_dropped();
            warn!(dispatcher = %self.settings.name, sensor = %report.sensor, "Report received while draining, dropped");
            return Flow::Drain;
        }

        match self.settings.route_table.resolve(&report) {
            Ok(key) => self.route(key, report, ctx).await,
            Err(e) => {
                self.metrics.inc_routing_failures();
                warn!(dispatcher = %self.settings.name, error = %e, "Unroutable report dropped");
            }
        }
        Flow::Continue
    }

    async fn on_end(&mut self, end: EndMessage, ctx: &ActorContext) -> Flow {
        if let Some(drain) = self.drain.as_mut() {
            if drain.pending.remove(&end.sender) {
                debug!(formula = %end.sender, remaining = drain.pending.len(), "Formula acknowledged");
                if drain.pending.is_empty() {
                    return self.finish(ctx).await;
                }
            } else {
                debug!(from = %end.sender, "Extra end-of-stream while draining, ignored");
            }
            return Flow::Drain;
        }

        self.upstream_ends += 1;
        if self.upstream_ends < self.settings.upstream_count {
            debug!(
                from = %end.sender,
                received = self.upstream_ends,
                expected = self.settings.upstream_count,
                "Upstream finished, waiting for the others"
            );
            return Flow::Continue;
        }
        self.begin_drain(ctx).await
    }

    fn drain_deadline(&self) -> Option<Instant> {
        self.drain.as_ref().and_then(|d| d.deadline)
    }

    async fn on_drain_timeout(&mut self, ctx: &ActorContext) -> Flow {
        if let Some(drain) = &self.drain {
            let missing: Vec<&str> = drain.pending.iter().map(ActorName::as_str).collect();
            warn!(
                dispatcher = %self.settings.name,
                ?missing,
                timeout_ms = self.settings.drain_timeout.as_millis() as u64,
                "Formulas did not acknowledge end-of-stream in time"
            );
        }
        self.finish(ctx).await
    }

    async fn on_terminate(&mut self, _ctx: &ActorContext) {
        if let Some(drain) = &self.drain {
            for handle in self.formulas.values() {
                if drain.pending.contains(handle.name()) {
                    handle.abort();
                }
            }
        }
        let snapshot = self.metrics.snapshot();
        info!(
            dispatcher = %self.settings.name,
            routed = snapshot.reports_routed,
            formulas = snapshot.formulas_created,
            routing_failures = snapshot.routing_failures,
            dropped = snapshot.reports_dropped,
            "Dispatcher terminated"
        );
        self.terminated = true;
    }
}

/// An aborted dispatcher never drains, and its formulas keep their own
/// mailbox open: abort them with it.
impl Drop for DispatcherActor {
    fn drop(&mut self) {
        if self.terminated {
            return;
        }
        for handle in self.formulas.values().filter(|h| !h.is_finished()) {
            warn!(dispatcher = %self.settings.name, formula = %handle.name(), "Aborting orphaned formula");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Formula, FormulaActor};
    use chrono::Utc;
    use contracts::{spawn_actor, ActorCell, IdentityField, LifecycleState, Message, ReportPayload};
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(String, Option<u32>)>>>;

    /// Records which formula saw which socket, produces nothing
    struct Recorder {
        name: String,
        seen: Seen,
    }

    impl Formula for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn compute(&mut self, report: &Report) -> Result<Vec<Report>, ContractError> {
            self.seen.lock().unwrap().push((self.name.clone(), report.socket));
            Ok(vec![report.clone()])
        }
    }

    /// Never acknowledges end-of-stream
    struct Deaf(ActorName);

    impl Actor for Deaf {
        fn name(&self) -> &ActorName {
            &self.0
        }

        fn kind(&self) -> ActorKind {
            ActorKind::Formula
        }

        async fn initialize(&mut self, _ctx: &ActorContext) -> Result<(), ContractError> {
            Ok(())
        }

        async fn on_report(&mut self, _report: Report, _ctx: &ActorContext) -> Flow {
            Flow::Continue
        }

        async fn on_end(&mut self, _end: EndMessage, _ctx: &ActorContext) -> Flow {
            Flow::Continue
        }

        async fn on_drain_timeout(&mut self, _ctx: &ActorContext) -> Flow {
            Flow::Continue
        }

        async fn on_terminate(&mut self, _ctx: &ActorContext) {}
    }

    fn socket_table() -> RouteTable {
        RouteTable::new()
            .with_rule(
                ReportKind::Hwpc,
                DispatchRule::new("by-socket", vec![IdentityField::Socket], true),
            )
            .unwrap()
    }

    fn hwpc(socket: u32) -> Report {
        Report::new(
            Utc::now(),
            "sensor",
            "all",
            ReportPayload::Hwpc {
                groups: Default::default(),
            },
        )
        .with_socket(socket)
    }

    fn registry_with(cells: &[&ActorCell]) -> ActorRegistry {
        let mut registry = ActorRegistry::new();
        for cell in cells {
            registry.register(cell.actor_ref()).unwrap();
        }
        registry
    }

    fn recording_factory(seen: Seen, calls: Arc<Mutex<Vec<String>>>) -> impl FormulaFactory {
        move |key: &RoutingKey, ctx: FormulaContext| {
            calls.lock().unwrap().push(key.to_string());
            let formula = Recorder {
                name: ctx.name.to_string(),
                seen: Arc::clone(&seen),
            };
            FormulaActor::spawn(formula, ctx)
        }
    }

    async fn recv_end(cell: &mut ActorCell) -> EndMessage {
        loop {
            match cell.recv().await {
                Some(Message::End(end)) => return end,
                Some(Message::Report(_)) => continue,
                None => panic!("mailbox closed"),
            }
        }
    }

    #[tokio::test]
    async fn one_formula_per_routing_key() {
        let mut out = ActorCell::new("out", ActorKind::Pusher, 32);
        let seen: Seen = Arc::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let settings = DispatcherSettings::new("dispatcher", socket_table()).with_pushers(["out"]);
        let actor = DispatcherActor::new(
            settings,
            registry_with(&[&out]),
            recording_factory(Arc::clone(&seen), Arc::clone(&calls)),
        );
        let metrics = actor.metrics();
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 32);
        let dispatcher_ref = cell.actor_ref();
        let mut handle = spawn_actor(actor, cell, None);
        handle.started().await.unwrap();

        for socket in [0, 0, 1] {
            dispatcher_ref.send_report(hwpc(socket)).await;
        }
        dispatcher_ref.send_end(&"puller".into()).await;

        let end = recv_end(&mut out).await;
        assert_eq!(end.sender, "dispatcher");
        handle.terminated().await;

        assert_eq!(*calls.lock().unwrap(), vec!["0".to_string(), "1".to_string()]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        for (formula, socket) in seen.iter() {
            let expected = format!("dispatcher-formula-{}", socket.unwrap());
            assert_eq!(formula, &expected);
        }
        assert_eq!(metrics.snapshot().formulas_created, 2);
        assert_eq!(metrics.snapshot().reports_routed, 3);
    }

    #[tokio::test]
    async fn aborted_dispatcher_takes_its_formulas_down() {
        let mut out = ActorCell::new("out", ActorKind::Pusher, 32);
        let states = Arc::new(Mutex::new(Vec::new()));
        let factory = {
            let states = Arc::clone(&states);
            move |_key: &RoutingKey, ctx: FormulaContext| {
                let formula = Recorder {
                    name: ctx.name.to_string(),
                    seen: Arc::default(),
                };
                let handle = FormulaActor::spawn(formula, ctx);
                states.lock().unwrap().push(handle.subscribe());
                handle
            }
        };

        let settings = DispatcherSettings::new("dispatcher", socket_table()).with_pushers(["out"]);
        let actor = DispatcherActor::new(settings, registry_with(&[&out]), factory);
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 32);
        let dispatcher_ref = cell.actor_ref();
        let mut handle = spawn_actor(actor, cell, None);
        handle.started().await.unwrap();

        dispatcher_ref.send_report(hwpc(0)).await;
        dispatcher_ref.send_report(hwpc(1)).await;
        for _ in 0..2 {
            assert!(matches!(out.recv().await, Some(Message::Report(_))));
        }

        handle.abort();
        handle.terminated().await;

        let receivers: Vec<_> = states.lock().unwrap().drain(..).collect();
        assert_eq!(receivers.len(), 2);
        for mut state in receivers {
            // A closed channel means the formula task is gone
            let outcome = tokio::time::timeout(
                Duration::from_secs(1),
                state.wait_for(|s| *s == LifecycleState::Terminated),
            )
            .await;
            assert!(outcome.is_ok(), "formula still running after dispatcher abort");
        }
    }

    #[tokio::test]
    async fn end_reaches_each_distinct_pusher_once() {
        let mut a = ActorCell::new("a", ActorKind::Pusher, 32);
        let mut b = ActorCell::new("b", ActorKind::Pusher, 32);
        let seen: Seen = Arc::default();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let settings = DispatcherSettings::new("dispatcher", socket_table())
            .with_pushers(["a", "b", "a"]);
        let actor = DispatcherActor::new(
            settings,
            registry_with(&[&a, &b]),
            recording_factory(seen, calls),
        );
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 32);
        let dispatcher_ref = cell.actor_ref();
        let handle = spawn_actor(actor, cell, None);

        for socket in [0, 1, 2] {
            dispatcher_ref.send_report(hwpc(socket)).await;
        }
        dispatcher_ref.send_end(&"puller".into()).await;
        handle.terminated().await;

        for cell in [&mut a, &mut b] {
            let mut reports = 0;
            let mut ends = 0;
            while let Some(msg) = cell.mailbox.try_recv() {
                match msg {
                    Message::Report(_) => reports += 1,
                    Message::End(_) => ends += 1,
                }
            }
            assert_eq!(reports, 3);
            assert_eq!(ends, 1);
        }
    }

    #[tokio::test]
    async fn waits_for_every_upstream() {
        let mut out = ActorCell::new("out", ActorKind::Pusher, 32);
        let settings = DispatcherSettings::new("dispatcher", socket_table())
            .with_pushers(["out"])
            .with_upstream_count(2);
        let actor = DispatcherActor::new(
            settings,
            registry_with(&[&out]),
            recording_factory(Arc::default(), Arc::default()),
        );
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 32);
        let dispatcher_ref = cell.actor_ref();
        let handle = spawn_actor(actor, cell, None);

        dispatcher_ref.send_end(&"puller-1".into()).await;
        dispatcher_ref.send_report(hwpc(4)).await;
        dispatcher_ref.send_end(&"puller-2".into()).await;
        handle.terminated().await;

        assert!(matches!(out.mailbox.try_recv(), Some(Message::Report(_))));
        assert!(matches!(out.mailbox.try_recv(), Some(Message::End(_))));
    }

    #[tokio::test]
    async fn unresponsive_formula_hits_drain_timeout() {
        let mut out = ActorCell::new("out", ActorKind::Pusher, 32);
        let factory = |_key: &RoutingKey, ctx: FormulaContext| {
            let cell = ActorCell::new(ctx.name.clone(), ActorKind::Formula, 8);
            spawn_actor(Deaf(ctx.name), cell, Some(ctx.dispatcher))
        };
        let settings = DispatcherSettings::new("dispatcher", socket_table())
            .with_pushers(["out"])
            .with_drain_timeout(Duration::from_millis(50));
        let actor = DispatcherActor::new(settings, registry_with(&[&out]), factory);
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 32);
        let dispatcher_ref = cell.actor_ref();
        let handle = spawn_actor(actor, cell, None);

        dispatcher_ref.send_report(hwpc(0)).await;
        dispatcher_ref.send_end(&"puller".into()).await;

        let end = tokio::time::timeout(Duration::from_secs(2), recv_end(&mut out))
            .await
            .expect("dispatcher must give up waiting");
        assert_eq!(end.sender, "dispatcher");
        handle.terminated().await;
    }

    #[tokio::test]
    async fn end_without_formulas_finishes_immediately() {
        let mut out = ActorCell::new("out", ActorKind::Pusher, 4);
        let settings = DispatcherSettings::new("dispatcher", socket_table()).with_pushers(["out"]);
        let actor = DispatcherActor::new(
            settings,
            registry_with(&[&out]),
            recording_factory(Arc::default(), Arc::default()),
        );
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 4);
        let dispatcher_ref = cell.actor_ref();
        let handle = spawn_actor(actor, cell, None);

        dispatcher_ref.send_end(&"puller".into()).await;
        handle.terminated().await;

        assert!(matches!(out.recv().await, Some(Message::End(_))));
        assert!(!dispatcher_ref.send_report(hwpc(0)).await);
    }

    #[tokio::test]
    async fn unroutable_report_is_dropped_not_fatal() {
        let out = ActorCell::new("out", ActorKind::Pusher, 4);
        let settings = DispatcherSettings::new("dispatcher", socket_table()).with_pushers(["out"]);
        let actor = DispatcherActor::new(
            settings,
            registry_with(&[&out]),
            recording_factory(Arc::default(), Arc::default()),
        );
        let metrics = actor.metrics();
        let cell = ActorCell::new("dispatcher", ActorKind::Dispatcher, 4);
        let dispatcher_ref = cell.actor_ref();
        let handle = spawn_actor(actor, cell, None);

        let power = Report::new(Utc::now(), "s", "t", ReportPayload::Power { power: 1.0 });
        dispatcher_ref.send_report(power).await;
        let no_socket = Report::new(Utc::now(), "s", "t", ReportPayload::Hwpc { groups: Default::default() });
        dispatcher_ref.send_report(no_socket).await;
        dispatcher_ref.send_end(&"puller".into()).await;
        handle.terminated().await;

        assert_eq!(metrics.snapshot().routing_failures, 2);
        assert_eq!(metrics.snapshot().formulas_created, 0);
    }

    #[tokio::test]
    async fn initialization_checks() {
        let out = ActorCell::new("out", ActorKind::Pusher, 4);
        let not_a_pusher = ActorCell::new("formula", ActorKind::Formula, 4);

        let cases = vec![
            DispatcherSettings::new("d1", RouteTable::new()).with_pushers(["out"]),
            DispatcherSettings::new(
                "d2",
                RouteTable::new()
                    .with_rule(
                        ReportKind::Hwpc,
                        DispatchRule::new("secondary", vec![IdentityField::Sensor], false),
                    )
                    .unwrap(),
            )
            .with_pushers(["out"]),
            DispatcherSettings::new("d3", socket_table()).with_pushers(["missing"]),
            DispatcherSettings::new("d4", socket_table()).with_pushers(["formula"]),
        ];

        for settings in cases {
            let name = settings.name.clone();
            let actor = DispatcherActor::new(
                settings,
                registry_with(&[&out, &not_a_pusher]),
                recording_factory(Arc::default(), Arc::default()),
            );
            let cell = ActorCell::new(name.clone(), ActorKind::Dispatcher, 4);
            let mut handle = spawn_actor(actor, cell, None);
            let err = handle.started().await.unwrap_err();
            assert!(
                matches!(err, ContractError::Initialization { ref actor, .. } if actor == name.as_str()),
                "unexpected error: {err}"
            );
        }
    }
}
