//! Database backends
//!
//! Contains LogDatabase, JsonLinesDatabase, and MemoryDatabase.

mod jsonl;
mod log;
mod memory;

pub use self::jsonl::JsonLinesDatabase;
pub use self::log::LogDatabase;
pub use self::memory::{MemoryDatabase, MemoryStore};

use contracts::{ContractError, OutputConfig, OutputKind, Report, ReportDatabase, ReportModel};
use tracing::instrument;

use crate::error::PusherError;

/// Any configured backend
pub enum Backend {
    Log(LogDatabase),
    JsonLines(JsonLinesDatabase),
    Memory(MemoryDatabase),
}

impl ReportDatabase for Backend {
    fn name(&self) -> &str {
        match self {
            Self::Log(db) => db.name(),
            Self::JsonLines(db) => db.name(),
            Self::Memory(db) => db.name(),
        }
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Log(db) => db.connect().await,
            Self::JsonLines(db) => db.connect().await,
            Self::Memory(db) => db.connect().await,
        }
    }

    async fn save(&mut self, report: &Report, model: ReportModel) -> Result<(), ContractError> {
        match self {
            Self::Log(db) => db.save(report, model).await,
            Self::JsonLines(db) => db.save(report, model).await,
            Self::Memory(db) => db.save(report, model).await,
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Log(db) => db.flush().await,
            Self::JsonLines(db) => db.flush().await,
            Self::Memory(db) => db.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Log(db) => db.close().await,
            Self::JsonLines(db) => db.close().await,
            Self::Memory(db) => db.close().await,
        }
    }
}

/// Create a backend from configuration
///
/// Params: `path` (jsonl, required), `store` (memory, defaults to the output name).
#[instrument(
    name = "pusher_create_database",
    skip(config),
    fields(output = %config.name, kind = ?config.kind)
)]
pub fn create_database(config: &OutputConfig) -> Result<Backend, PusherError> {
    match config.kind {
        OutputKind::Log => Ok(Backend::Log(LogDatabase::new(&config.name))),
        OutputKind::Jsonl => {
            let path = config
                .params
                .get("path")
                .ok_or_else(|| PusherError::missing_param(&config.name, "path"))?;
            Ok(Backend::JsonLines(JsonLinesDatabase::new(&config.name, path)))
        }
        OutputKind::Memory => {
            let key = config.params.get("store").unwrap_or(&config.name);
            Ok(Backend::Memory(MemoryDatabase::new(
                &config.name,
                MemoryStore::shared(key),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SaveFailurePolicy;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn output(kind: OutputKind, params: &[(&str, &str)]) -> OutputConfig {
        OutputConfig {
            name: "out".to_string(),
            kind,
            model: ReportModel::Power,
            on_save_error: SaveFailurePolicy::Continue,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn jsonl_needs_path() {
        let err = create_database(&output(OutputKind::Jsonl, &[])).err().unwrap();
        assert!(matches!(err, PusherError::MissingParam { ref key, .. } if key == "path"));
        assert!(create_database(&output(OutputKind::Jsonl, &[("path", "/tmp/x.jsonl")])).is_ok());
    }

    #[test]
    fn memory_uses_named_store() {
        let db = create_database(&output(OutputKind::Memory, &[("store", "backend-test-store")])).unwrap();
        let Backend::Memory(db) = db else {
            panic!("expected memory backend");
        };
        assert!(Arc::ptr_eq(&db.store(), &MemoryStore::shared("backend-test-store")));
    }
}
