//! ReportProducer trait - Puller input interface

use async_trait::async_trait;

use crate::{ContractError, Report};

/// External feed of reports read by a puller.
///
/// Object-safe so pullers can own any producer as `Box<dyn ReportProducer>`.
#[async_trait]
pub trait ReportProducer: Send {
    fn name(&self) -> &str;

    /// # Errors
    /// Returns a producer error when the feed cannot be opened
    async fn connect(&mut self) -> Result<(), ContractError>;

    /// Next report, `Ok(None)` at end of stream
    async fn read(&mut self) -> Result<Option<Report>, ContractError>;
}
