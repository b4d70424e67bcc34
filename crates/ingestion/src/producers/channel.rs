//! ChannelProducer - in-process report feed

use async_channel::{bounded, Receiver, Sender};
use async_trait::async_trait;

use contracts::{ContractError, Report, ReportProducer};

use crate::error::IngestionError;

/// Producer fed through an `async_channel` sender.
///
/// The stream ends once every sender is dropped and the buffer is drained.
pub struct ChannelProducer {
    name: String,
    rx: Receiver<Report>,
}

impl ChannelProducer {
    /// Create a producer and the sender that feeds it
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, Sender<Report>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                name: name.into(),
                rx,
            },
            tx,
        )
    }

    pub fn from_receiver(name: impl Into<String>, rx: Receiver<Report>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }
}

#[async_trait]
impl ReportProducer for ChannelProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        if self.rx.is_closed() && self.rx.is_empty() {
            return Err(IngestionError::ChannelClosed {
                producer: self.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Report>, ContractError> {
        Ok(self.rx.recv().await.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::ReportPayload;

    #[tokio::test]
    async fn buffered_reports_survive_sender_drop() {
        let (mut producer, tx) = ChannelProducer::new("feed", 4);
        tx.send(Report::new(Utc::now(), "s", "t", ReportPayload::Generic))
            .await
            .unwrap();
        drop(tx);

        producer.connect().await.unwrap();
        assert!(producer.read().await.unwrap().is_some());
        assert!(producer.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_and_empty_channel_cannot_connect() {
        let (mut producer, tx) = ChannelProducer::new("feed", 4);
        drop(tx);
        let err = producer.connect().await.unwrap_err();
        assert!(matches!(err, ContractError::Producer { .. }));
    }
}
