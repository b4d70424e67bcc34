//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Puller output was already rebound once
    #[error("puller '{puller}' is already bound to a processor")]
    AlreadyBound {
        /// Puller name
        puller: String,
    },

    /// Producer file could not be read
    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Producer channel closed before use
    #[error("channel closed for producer {producer}")]
    ChannelClosed {
        /// Producer name
        producer: String,
    },

    /// Bad producer parameter
    #[error("invalid parameter '{key}' for producer {producer}: {message}")]
    InvalidParam {
        producer: String,
        key: String,
        message: String,
    },
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::InvalidParam { ref key, .. } => {
                ContractError::config_validation(format!("inputs.params.{key}"), err.to_string())
            }
            e => ContractError::producer(e.to_string()),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
