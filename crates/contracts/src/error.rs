//! Layered error definitions
//!
//! Categorized by source: config / initialization / routing / database / producer

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Lifecycle Errors =====
    /// Actor could not leave the Initializing state
    #[error("actor '{actor}' failed to initialize: {message}")]
    Initialization { actor: String, message: String },

    // ===== Routing Errors =====
    /// Report could not be mapped to a routing key
    #[error("routing error: {message}")]
    Routing { message: String },

    // ===== Backend Errors =====
    /// Persistence backend error (connect / save)
    #[error("database error: {message}")]
    Database { message: String },

    /// External report producer error (connect / read)
    #[error("producer error: {message}")]
    Producer { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create initialization error
    pub fn initialization(actor: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Initialization {
            actor: actor.into(),
            message: message.into(),
        }
    }

    /// Create routing error
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Create database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create producer error
    pub fn producer(message: impl Into<String>) -> Self {
        Self::Producer {
            message: message.into(),
        }
    }
}
