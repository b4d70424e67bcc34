//! Actor runtime primitives
//!
//! Mailboxes, references, lifecycle states and the name registry shared by every
//! actor kind. The message loop itself lives in [`crate::actor`].

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;

use crate::{ActorName, ContractError, Report};

/// Default mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 128;

/// Actor kind, checked by the binding manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Puller,
    Dispatcher,
    Formula,
    Pusher,
    Processor,
    Supervisor,
}

impl ActorKind {
    /// Whether a puller pre-wired to this kind may be rebound to a processor
    pub fn is_rebindable(&self) -> bool {
        matches!(self, Self::Dispatcher)
    }

    /// Whether this kind may become a puller's filter target through a binding
    pub fn accepts_bindings(&self) -> bool {
        matches!(self, Self::Processor)
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Puller => "puller",
            Self::Dispatcher => "dispatcher",
            Self::Formula => "formula",
            Self::Pusher => "pusher",
            Self::Processor => "processor",
            Self::Supervisor => "supervisor",
        };
        f.write_str(label)
    }
}

/// End-of-stream signal, tagged with the actor that sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndMessage {
    pub sender: ActorName,
}

impl EndMessage {
    pub fn new(sender: impl Into<ActorName>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

/// Mailbox message
#[derive(Debug, Clone)]
pub enum Message {
    Report(Report),
    End(EndMessage),
}

/// Actor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initializing,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Cloneable address of an actor mailbox
#[derive(Clone)]
pub struct ActorRef {
    name: ActorName,
    kind: ActorKind,
    tx: mpsc::Sender<Message>,
}

impl ActorRef {
    pub fn name(&self) -> &ActorName {
        &self.name
    }

    pub fn kind(&self) -> ActorKind {
        self.kind
    }

    /// Deliver a message, waiting for mailbox capacity.
    ///
    /// Returns `false` when the actor has terminated; the message is dropped.
    pub async fn send(&self, msg: Message) -> bool {
        match self.tx.send(msg).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(msg)) => {
                warn!(actor = %self.name, message = msg.label(), "Mailbox closed, message dropped");
                false
            }
        }
    }

    /// Deliver a report
    pub async fn send_report(&self, report: Report) -> bool {
        self.send(Message::Report(report)).await
    }

    /// Deliver an end-of-stream signal on behalf of `sender`
    pub async fn send_end(&self, sender: &ActorName) -> bool {
        self.send(Message::End(EndMessage::new(sender.clone()))).await
    }

    /// Non-blocking delivery, `false` when the mailbox is full or closed
    pub fn try_send(&self, msg: Message) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(actor = %self.name, message = msg.label(), "Mailbox full, message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!(actor = %self.name, message = msg.label(), "Mailbox closed, message dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both refs address the same mailbox
    pub fn same_mailbox(&self, other: &ActorRef) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Message {
    fn label(&self) -> &'static str {
        match self {
            Self::Report(_) => "report",
            Self::End(_) => "end",
        }
    }
}

/// Receiving side of an actor mailbox
pub struct Mailbox {
    rx: mpsc::Receiver<Message>,
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Refuse further messages; already queued ones stay readable
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Discard whatever is still queued, returning how many messages were lost
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// Mailbox plus its address, created before the actor runs.
///
/// Refs can be handed out (and messages queued) before the loop starts, which is
/// how a topology is wired before any actor is spawned.
pub struct ActorCell {
    pub actor_ref: ActorRef,
    pub mailbox: Mailbox,
}

impl ActorCell {
    pub fn new(name: impl Into<ActorName>, kind: ActorKind, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            actor_ref: ActorRef {
                name: name.into(),
                kind,
                tx,
            },
            mailbox: Mailbox { rx },
        }
    }

    pub fn actor_ref(&self) -> ActorRef {
        self.actor_ref.clone()
    }

    pub fn name(&self) -> &ActorName {
        &self.actor_ref.name
    }

    /// Receive on the cell's own mailbox (probe actors in tests)
    pub async fn recv(&mut self) -> Option<Message> {
        self.mailbox.recv().await
    }
}

/// Name -> ActorRef lookup, names unique within one supervision tree
#[derive(Debug, Clone, Default)]
pub struct ActorRegistry {
    refs: HashMap<ActorName, ActorRef>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns a validation error when the name is already registered.
    pub fn register(&mut self, actor_ref: ActorRef) -> Result<(), ContractError> {
        if self.refs.contains_key(actor_ref.name()) {
            return Err(ContractError::config_validation(
                "name",
                format!("actor '{}' is already registered", actor_ref.name()),
            ));
        }
        self.refs.insert(actor_ref.name().clone(), actor_ref);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ActorRef> {
        self.refs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.refs.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ActorRef> {
        self.refs.remove(name)
    }

    /// All refs of one kind
    pub fn of_kind(&self, kind: ActorKind) -> impl Iterator<Item = &ActorRef> {
        self.refs.values().filter(move |r| r.kind() == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorRef> {
        self.refs.values()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReportPayload;
    use chrono::Utc;

    fn report() -> Report {
        Report::new(Utc::now(), "s", "t", ReportPayload::Generic)
    }

    #[tokio::test]
    async fn messages_queue_before_receiver_runs() {
        let mut cell = ActorCell::new("probe", ActorKind::Pusher, 4);
        let actor_ref = cell.actor_ref();

        assert!(actor_ref.send_report(report()).await);
        assert!(actor_ref.send_end(&"puller".into()).await);

        assert!(matches!(cell.recv().await, Some(Message::Report(_))));
        match cell.recv().await {
            Some(Message::End(end)) => assert_eq!(end.sender, "puller"),
            other => panic!("expected end, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_to_closed_mailbox_returns_false() {
        let mut cell = ActorCell::new("gone", ActorKind::Formula, 4);
        let actor_ref = cell.actor_ref();
        cell.mailbox.close();

        assert!(!actor_ref.send_report(report()).await);
        assert!(actor_ref.is_closed());
    }

    #[test]
    fn try_send_full_mailbox() {
        let cell = ActorCell::new("tiny", ActorKind::Pusher, 1);
        assert!(cell.actor_ref.try_send(Message::Report(report())));
        assert!(!cell.actor_ref.try_send(Message::Report(report())));
    }

    #[test]
    fn discard_pending_counts() {
        let mut cell = ActorCell::new("x", ActorKind::Pusher, 8);
        for _ in 0..3 {
            cell.actor_ref.try_send(Message::Report(report()));
        }
        cell.mailbox.close();
        assert_eq!(cell.mailbox.discard_pending(), 3);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ActorRegistry::new();
        registry
            .register(ActorCell::new("out", ActorKind::Pusher, 1).actor_ref())
            .unwrap();
        let err = registry
            .register(ActorCell::new("out", ActorKind::Dispatcher, 1).actor_ref())
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_filters_by_kind() {
        let mut registry = ActorRegistry::new();
        registry.register(ActorCell::new("a", ActorKind::Pusher, 1).actor_ref()).unwrap();
        registry.register(ActorCell::new("b", ActorKind::Pusher, 1).actor_ref()).unwrap();
        registry.register(ActorCell::new("d", ActorKind::Dispatcher, 1).actor_ref()).unwrap();

        assert_eq!(registry.of_kind(ActorKind::Pusher).count(), 2);
        assert_eq!(registry.get("d").map(ActorRef::kind), Some(ActorKind::Dispatcher));
    }

    #[test]
    fn only_dispatcher_is_rebindable() {
        assert!(ActorKind::Dispatcher.is_rebindable());
        assert!(!ActorKind::Processor.is_rebindable());
        assert!(ActorKind::Processor.accepts_bindings());
        assert!(!ActorKind::Pusher.accepts_bindings());
    }
}
