//! Actor trait and message loop
//!
//! Every actor kind is a handler table (`initialize`, `on_report`, `on_end`, ...)
//! driven by [`spawn_actor`], which owns the mailbox and the lifecycle state.

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    ActorCell, ActorKind, ActorName, ActorRef, ContractError, EndMessage, LifecycleState, Message,
    Report,
};

/// What the message loop does after a handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep processing messages
    Continue,
    /// Enter `Draining`, keep processing until `Stop`
    Drain,
    /// Leave the loop and terminate
    Stop,
}

/// Handles available to a running actor
#[derive(Debug, Clone)]
pub struct ActorContext {
    myself: ActorRef,
    parent: Option<ActorRef>,
}

impl ActorContext {
    pub fn new(myself: ActorRef, parent: Option<ActorRef>) -> Self {
        Self { myself, parent }
    }

    pub fn myself(&self) -> &ActorRef {
        &self.myself
    }

    pub fn parent(&self) -> Option<&ActorRef> {
        self.parent.as_ref()
    }

    /// Send end-of-stream, tagged with this actor's name, to the parent
    pub async fn notify_parent_end(&self) -> bool {
        match &self.parent {
            Some(parent) => parent.send_end(self.myself.name()).await,
            None => {
                debug!(actor = %self.myself.name(), "No parent to notify");
                false
            }
        }
    }
}

/// Actor behaviour
///
/// Handlers run one message at a time on the actor's own task, so implementors
/// can mutate their state without locking.
#[trait_variant::make(Actor: Send)]
pub trait LocalActor {
    fn name(&self) -> &ActorName;

    fn kind(&self) -> ActorKind;

    /// Runs once before the first message.
    ///
    /// # Errors
    /// Any error keeps the actor from reaching `Running`.
    async fn initialize(&mut self, ctx: &ActorContext) -> Result<(), ContractError>;

    async fn on_report(&mut self, report: Report, ctx: &ActorContext) -> Flow;

    async fn on_end(&mut self, end: EndMessage, ctx: &ActorContext) -> Flow;

    /// Deadline for the next message while draining
    fn drain_deadline(&self) -> Option<Instant> {
        None
    }

    /// Called when `drain_deadline` passes with no message
    async fn on_drain_timeout(&mut self, ctx: &ActorContext) -> Flow;

    /// Last call before the mailbox closes
    async fn on_terminate(&mut self, ctx: &ActorContext);
}

/// Running actor
pub struct ActorHandle {
    actor_ref: ActorRef,
    state: watch::Receiver<LifecycleState>,
    started: Option<oneshot::Receiver<Result<(), ContractError>>>,
    init_failed: bool,
    task: JoinHandle<()>,
}

impl ActorHandle {
    pub fn name(&self) -> &ActorName {
        self.actor_ref.name()
    }

    pub fn kind(&self) -> ActorKind {
        self.actor_ref.kind()
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor_ref
    }

    /// Current lifecycle state. An aborted task reports `Terminated`.
    pub fn state(&self) -> LifecycleState {
        if self.state.has_changed().is_err() {
            return LifecycleState::Terminated;
        }
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.clone()
    }

    /// Wait for initialization to finish.
    ///
    /// # Errors
    /// Returns the initialization error if the actor failed to start.
    pub async fn started(&mut self) -> Result<(), ContractError> {
        if self.init_failed {
            return Err(ContractError::initialization(
                self.name().as_str(),
                "initialization already failed",
            ));
        }
        let Some(rx) = self.started.take() else {
            return Ok(());
        };
        let outcome = rx.await.unwrap_or_else(|_| {
            Err(ContractError::initialization(
                self.actor_ref.name().as_str(),
                "actor task ended before initialization",
            ))
        });
        self.init_failed = outcome.is_err();
        outcome
    }

    /// Wait until the actor reaches `Terminated` (or its task is gone)
    pub async fn terminated(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == LifecycleState::Terminated).await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the actor task without running `on_terminate`
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("actor", &self.actor_ref)
            .field("state", &self.state())
            .finish()
    }
}

/// Run `actor` on its own task, reading from `cell`'s mailbox.
pub fn spawn_actor<A>(actor: A, cell: ActorCell, parent: Option<ActorRef>) -> ActorHandle
where
    A: Actor + 'static,
{
    let ActorCell { actor_ref, mailbox } = cell;
    let (state_tx, state_rx) = watch::channel(LifecycleState::Created);
    let (started_tx, started_rx) = oneshot::channel();
    let ctx = ActorContext::new(actor_ref.clone(), parent);

    let task = tokio::spawn(run_loop(actor, mailbox, ctx, state_tx, started_tx));

    ActorHandle {
        actor_ref,
        state: state_rx,
        started: Some(started_rx),
        init_failed: false,
        task,
    }
}

async fn run_loop<A: Actor>(
    mut actor: A,
    mut mailbox: crate::Mailbox,
    ctx: ActorContext,
    state: watch::Sender<LifecycleState>,
    started: oneshot::Sender<Result<(), ContractError>>,
) {
    let name = ctx.myself().name().clone();
    let kind = ctx.myself().kind();

    state.send_replace(LifecycleState::Initializing);
    if let Err(e) = actor.initialize(&ctx).await {
        error!(actor = %name, %kind, error = %e, "Actor failed to initialize");
        mailbox.close();
        mailbox.discard_pending();
        state.send_replace(LifecycleState::Terminated);
        let _ = started.send(Err(e));
        return;
    }
    state.send_replace(LifecycleState::Running);
    let _ = started.send(Ok(()));
    debug!(actor = %name, %kind, "Actor running");

    loop {
        let next = match actor.drain_deadline() {
            Some(deadline) => match timeout_at(deadline, mailbox.recv()).await {
                Ok(msg) => msg,
                Err(_) => {
                    let flow = actor.on_drain_timeout(&ctx).await;
                    if apply_flow(flow, &state) {
                        break;
                    }
                    continue;
                }
            },
            None => mailbox.recv().await,
        };

        let Some(msg) = next else {
            debug!(actor = %name, "Mailbox closed");
            break;
        };

        let flow = match msg {
            Message::Report(report) => actor.on_report(report, &ctx).await,
            Message::End(end) => actor.on_end(end, &ctx).await,
        };
        if apply_flow(flow, &state) {
            break;
        }
    }

    actor.on_terminate(&ctx).await;
    mailbox.close();
    state.send_replace(LifecycleState::Terminated);

    let dropped = mailbox.discard_pending();
    if dropped > 0 {
        warn!(actor = %name, dropped, "Messages dropped after termination");
    }
    info!(actor = %name, %kind, "Actor terminated");
}

/// Returns true when the loop must stop
fn apply_flow(flow: Flow, state: &watch::Sender<LifecycleState>) -> bool {
    match flow {
        Flow::Continue => false,
        Flow::Drain => {
            if *state.borrow() != LifecycleState::Draining {
                state.send_replace(LifecycleState::Draining);
            }
            false
        }
        Flow::Stop => true,
    }
}
