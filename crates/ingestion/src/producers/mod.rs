//! Report producers

mod channel;
mod jsonl;
mod synthetic;

pub use channel::ChannelProducer;
pub use jsonl::JsonLinesProducer;
pub use synthetic::{SyntheticConfig, SyntheticProducer};

use contracts::{InputConfig, InputKind, ReportProducer};

use crate::error::{IngestionError, Result};

/// Create the producer described by an input section
pub fn create_producer(config: &InputConfig) -> Result<Box<dyn ReportProducer>> {
    match config.kind {
        InputKind::Synthetic => {
            let synthetic = SyntheticConfig::from_params(&config.name, &config.params)?;
            Ok(Box::new(SyntheticProducer::new(&config.name, synthetic)))
        }
        InputKind::Jsonl => {
            let path = config
                .params
                .get("path")
                .ok_or_else(|| IngestionError::InvalidParam {
                    producer: config.name.clone(),
                    key: "path".to_string(),
                    message: "required for jsonl inputs".to_string(),
                })?;
            Ok(Box::new(JsonLinesProducer::new(&config.name, path)))
        }
    }
}
