//! Actor Factory error types

use contracts::{ActorKind, ContractError};
use thiserror::Error;

/// Actor Factory specific error
#[derive(Debug, Error)]
pub enum ActorFactoryError {
    /// Binding names a puller that does not exist
    #[error("actor '{name}' does not exist")]
    UnexistingActor { name: String },

    /// Actor kind cannot take part in a binding
    #[error("actor '{name}' of kind {kind} cannot be used in this binding")]
    UnsupportedActorType { name: String, kind: ActorKind },

    /// Puller already bound, or named by two processors
    #[error("puller '{puller}' is already the target of another binding")]
    TargetActorAlreadyUsed { puller: String },

    /// Two actors with one name in the supervision tree
    #[error("actor '{name}' is already registered")]
    DuplicateActor { name: String },

    /// Actor failed to initialize
    #[error("failed to launch actor '{name}': {source}")]
    LaunchFailed {
        name: String,
        #[source]
        source: ContractError,
    },

    /// Drain did not complete in time
    #[error("timed out waiting for {pending:?}")]
    JoinTimeout { pending: Vec<String> },

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl ActorFactoryError {
    pub fn unexisting_actor(name: impl Into<String>) -> Self {
        Self::UnexistingActor { name: name.into() }
    }

    pub fn unsupported_actor_type(name: impl Into<String>, kind: ActorKind) -> Self {
        Self::UnsupportedActorType {
            name: name.into(),
            kind,
        }
    }

    pub fn target_actor_already_used(puller: impl Into<String>) -> Self {
        Self::TargetActorAlreadyUsed {
            puller: puller.into(),
        }
    }
}

impl From<dispatcher::DispatcherError> for ActorFactoryError {
    fn from(err: dispatcher::DispatcherError) -> Self {
        Self::Contract(err.into())
    }
}

impl From<ingestion::IngestionError> for ActorFactoryError {
    fn from(err: ingestion::IngestionError) -> Self {
        match err {
            ingestion::IngestionError::AlreadyBound { puller } => {
                Self::TargetActorAlreadyUsed { puller }
            }
            e => Self::Contract(e.into()),
        }
    }
}

impl From<pusher::PusherError> for ActorFactoryError {
    fn from(err: pusher::PusherError) -> Self {
        Self::Contract(err.into())
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, ActorFactoryError>;
