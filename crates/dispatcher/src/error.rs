//! Dispatcher error types

use contracts::{ContractError, IdentityField, ReportKind};
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A rule is already registered for this report type
    #[error("a dispatch rule is already registered for '{kind}' reports")]
    DuplicateRule { kind: ReportKind },

    /// Second primary rule in one table
    #[error("rule '{rule}' cannot be primary, '{existing}' already is")]
    PrimaryRuleConflict { existing: String, rule: String },

    /// No rule for the report type
    #[error("no dispatch rule for '{kind}' reports")]
    NoRule { kind: ReportKind },

    /// Report lacks an identity field the rule extracts
    #[error("rule '{rule}' needs field '{field}' which the report does not carry")]
    MissingField { rule: String, field: IdentityField },

    #[error("route table is empty")]
    EmptyRouteTable,

    #[error("route table has no primary rule")]
    NoPrimaryRule,

    /// Configured pusher is not a registered pusher actor
    #[error("pusher '{name}' is not a registered pusher")]
    UnresolvedPusher { name: String },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl From<DispatcherError> for ContractError {
    fn from(err: DispatcherError) -> Self {
        match err {
            DispatcherError::Contract(inner) => inner,
            e @ (DispatcherError::NoRule { .. } | DispatcherError::MissingField { .. }) => {
                ContractError::routing(e.to_string())
            }
            e => ContractError::config_validation("dispatcher", e.to_string()),
        }
    }
}
