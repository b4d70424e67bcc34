//! ReportDatabase trait - Pusher persistence interface

use crate::{ContractError, Report, ReportModel};

/// Persistence backend consumed by a pusher
///
/// All backends must implement this trait.
#[trait_variant::make(ReportDatabase: Send)]
pub trait LocalReportDatabase {
    /// Backend name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Open the backend
    ///
    /// # Errors
    /// Returns a database error when the backend is unreachable
    async fn connect(&mut self) -> Result<(), ContractError>;

    /// Store one report using `model`'s record shape
    async fn save(&mut self, report: &Report, model: ReportModel) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close backend
    async fn close(&mut self) -> Result<(), ContractError>;
}
