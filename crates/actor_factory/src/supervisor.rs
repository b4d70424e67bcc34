//! Supervisor - root of the actor tree
//!
//! Every top-level actor (pushers, dispatcher, processors, pullers) is launched
//! with the supervisor as its parent. Pushers acknowledge end-of-stream to it,
//! which is how `join` knows the pipeline has drained.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use contracts::{
    spawn_actor, Actor, ActorCell, ActorHandle, ActorKind, ActorName, ActorRef, ActorRegistry,
    LifecycleState, Mailbox, Message,
};

use crate::error::{ActorFactoryError, Result};

pub struct Supervisor {
    name: ActorName,
    myself: ActorRef,
    mailbox: Mailbox,
    registry: ActorRegistry,
    /// Launch order
    handles: Vec<ActorHandle>,
    /// Pushers that acknowledged end-of-stream
    finished: BTreeSet<ActorName>,
}

impl Supervisor {
    pub fn new(name: impl Into<ActorName>, capacity: usize) -> Self {
        let cell = ActorCell::new(name, ActorKind::Supervisor, capacity);
        Self {
            name: cell.name().clone(),
            myself: cell.actor_ref(),
            mailbox: cell.mailbox,
            registry: ActorRegistry::new(),
            handles: Vec::new(),
            finished: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &ActorName {
        &self.name
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.myself
    }

    /// Launched actors, by name
    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn handle(&self, name: &str) -> Option<&ActorHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    /// Launch `actor` on a fresh mailbox
    pub async fn launch<A>(&mut self, actor: A, capacity: usize) -> Result<ActorRef>
    where
        A: Actor + 'static,
    {
        let cell = ActorCell::new(actor.name().clone(), actor.kind(), capacity);
        self.launch_in(actor, cell).await
    }

    /// Launch `actor` on a mailbox created beforehand, so its reference could
    /// be handed out before it started.
    ///
    /// Waits for initialization; a failed actor is not registered.
    ///
    /// # Errors
    /// `DuplicateActor` if the name is taken, `LaunchFailed` if `initialize` failed.
    #[instrument(name = "supervisor_launch", skip(self, actor, cell), fields(actor = %cell.name()))]
    pub async fn launch_in<A>(&mut self, actor: A, cell: ActorCell) -> Result<ActorRef>
    where
        A: Actor + 'static,
    {
        let name = cell.name().clone();
        if self.registry.contains(name.as_str()) {
            return Err(ActorFactoryError::DuplicateActor {
                name: name.to_string(),
            });
        }

        let mut handle = spawn_actor(actor, cell, Some(self.myself.clone()));
        if let Err(source) = handle.started().await {
            warn!(error = %source, "Actor failed to start");
            return Err(ActorFactoryError::LaunchFailed {
                name: name.to_string(),
                source,
            });
        }

        let actor_ref = handle.actor_ref().clone();
        self.registry.register(actor_ref.clone())?;
        debug!(kind = %actor_ref.kind(), "Actor launched");
        self.handles.push(handle);
        Ok(actor_ref)
    }

    /// Lifecycle state of every launched actor, in launch order
    pub fn states(&self) -> Vec<(ActorName, ActorKind, LifecycleState)> {
        self.handles
            .iter()
            .map(|h| (h.name().clone(), h.kind(), h.state()))
            .collect()
    }

    /// Pushers that acknowledged end-of-stream so far
    pub fn finished_pushers(&self) -> impl Iterator<Item = &ActorName> {
        self.finished.iter()
    }

    /// Ask every puller to stop reading and start the end-of-stream cascade
    pub async fn stop_sources(&self) {
        for puller in self.registry.of_kind(ActorKind::Puller) {
            if puller.send_end(&self.name).await {
                debug!(puller = %puller.name(), "Stop requested");
            }
        }
    }

    /// Wait for every pusher to acknowledge end-of-stream, then for every
    /// launched actor to terminate.
    ///
    /// # Errors
    /// `JoinTimeout` naming the actors still pending when `timeout` expires.
    #[instrument(name = "supervisor_join", skip(self), fields(supervisor = %self.name))]
    pub async fn join(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let pushers: BTreeSet<ActorName> = self
            .registry
            .of_kind(ActorKind::Pusher)
            .map(|p| p.name().clone())
            .collect();

        while !pushers.is_subset(&self.finished) {
            match timeout_at(deadline, self.mailbox.recv()).await {
                Ok(Some(Message::End(end))) => {
                    debug!(from = %end.sender, "End-of-stream acknowledged");
                    self.finished.insert(end.sender);
                }
                Ok(Some(Message::Report(report))) => {
                    warn!(sensor = %report.sensor, "Supervisor does not take reports, dropped");
                }
                Ok(None) => break,
                Err(_) => {
                    let pending = pushers
                        .difference(&self.finished)
                        .map(ToString::to_string)
                        .collect();
                    return Err(ActorFactoryError::JoinTimeout { pending });
                }
            }
        }

        let mut pending = Vec::new();
        for handle in &self.handles {
            if timeout_at(deadline, handle.terminated()).await.is_err() {
                pending.push(handle.name().to_string());
            }
        }
        if !pending.is_empty() {
            return Err(ActorFactoryError::JoinTimeout { pending });
        }

        info!(actors = self.handles.len(), "All actors terminated");
        Ok(())
    }

    /// Abort every launched actor, most recent first. Idempotent.
    pub fn kill_all(&mut self) {
        for handle in self.handles.iter().rev() {
            if !handle.is_finished() {
                warn!(actor = %handle.name(), "Killing actor");
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("actors", &self.handles.len())
            .finish()
    }
}
