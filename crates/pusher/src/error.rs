//! Pusher error types

use std::path::Path;

use thiserror::Error;

/// Pusher-specific errors
#[derive(Debug, Error)]
pub enum PusherError {
    /// Backend parameter missing from the output section
    #[error("output '{output}' requires parameter '{key}'")]
    MissingParam { output: String, key: String },

    /// File-backed backend could not touch its file
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Backend error (from contract)
    #[error("backend error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl PusherError {
    pub fn missing_param(output: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingParam {
            output: output.into(),
            key: key.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<PusherError> for contracts::ContractError {
    fn from(err: PusherError) -> Self {
        match err {
            PusherError::Contract(inner) => inner,
            e @ PusherError::Io { .. } => Self::database(e.to_string()),
            e @ PusherError::MissingParam { .. } => Self::config_validation("outputs.params", e.to_string()),
        }
    }
}
