//! JsonLinesDatabase - appends one record per line to a file

use std::path::{Path, PathBuf};

use contracts::{ContractError, Report, ReportDatabase, ReportModel};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use crate::error::PusherError;

/// File-backed database
pub struct JsonLinesDatabase {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonLinesDatabase {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            writer: None,
        }
    }

    fn not_connected(&self) -> ContractError {
        ContractError::database(format!("database {} is not connected", self.name))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ContractError + '_ {
    move |source| PusherError::io(path, source).into()
}

impl ReportDatabase for JsonLinesDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "jsonl_database_connect", skip(self), fields(database = %self.name, path = %self.path.display()))]
    async fn connect(&mut self) -> Result<(), ContractError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error(&self.path))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    async fn save(&mut self, report: &Report, model: ReportModel) -> Result<(), ContractError> {
        let record = model.to_record(report)?;
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| ContractError::database(format!("serialize error: {e}")))?;
        line.push(b'\n');
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.not_connected());
        };
        writer.write_all(&line).await.map_err(io_error(&self.path))
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await.map_err(io_error(&self.path))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await.map_err(io_error(&self.path))?;
            writer.shutdown().await.map_err(io_error(&self.path))?;
        }
        debug!(database = %self.name, "JsonLinesDatabase closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::ReportPayload;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("power.jsonl");
        let mut db = JsonLinesDatabase::new("file", &path);
        db.connect().await.unwrap();

        for power in [1.0, 2.0] {
            let report = Report::new(Utc::now(), "s", "vm", ReportPayload::Power { power });
            db.save(&report, ReportModel::Power).await.unwrap();
        }
        db.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["power"], 2.0);
    }

    #[tokio::test]
    async fn unwritable_path_is_a_database_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut db = JsonLinesDatabase::new("file", blocker.join("power.jsonl"));
        let err = db.connect().await.unwrap_err();
        assert!(matches!(err, ContractError::Database { .. }));
        assert!(err.to_string().contains("blocker"), "got: {err}");
    }

    #[tokio::test]
    async fn save_before_connect_fails() {
        let dir = tempdir().unwrap();
        let mut db = JsonLinesDatabase::new("file", dir.path().join("x.jsonl"));
        let report = Report::new(Utc::now(), "s", "vm", ReportPayload::Power { power: 1.0 });
        assert!(db.save(&report, ReportModel::Power).await.is_err());
    }
}
