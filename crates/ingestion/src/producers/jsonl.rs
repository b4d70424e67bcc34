//! JsonLinesProducer - replays reports from a JSON-lines file

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use contracts::{ContractError, Report, ReportProducer};

use crate::error::IngestionError;

/// One serialized [`Report`] per line; blank lines are skipped, malformed lines
/// are logged and skipped.
pub struct JsonLinesProducer {
    name: String,
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
    skipped: usize,
}

impl JsonLinesProducer {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            lines: None,
            line_no: 0,
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[async_trait]
impl ReportProducer for JsonLinesProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        let file = File::open(&self.path)
            .await
            .map_err(|source| IngestionError::FileRead {
                path: self.path.display().to_string(),
                source,
            })?;
        self.lines = Some(BufReader::new(file).lines());
        debug!(producer = %self.name, path = %self.path.display(), "Report file opened");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Report>, ContractError> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| ContractError::producer(format!("producer {} is not connected", self.name)))?;

        loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Report>(line) {
                Ok(report) => return Ok(Some(report)),
                Err(e) => {
                    self.skipped += 1;
                    warn!(producer = %self.name, line = self.line_no, error = %e, "Malformed report skipped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::ReportPayload;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn reads_reports_and_skips_garbage() {
        let report = Report::new(Utc::now(), "s", "t", ReportPayload::Power { power: 3.0 });
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", serde_json::to_string(&report).unwrap()).unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, "{}", serde_json::to_string(&report).unwrap()).unwrap();

        let mut producer = JsonLinesProducer::new("file", file.path());
        producer.connect().await.unwrap();

        assert_eq!(producer.read().await.unwrap(), Some(report.clone()));
        assert_eq!(producer.read().await.unwrap(), Some(report));
        assert_eq!(producer.read().await.unwrap(), None);
        assert_eq!(producer.skipped(), 1);
    }

    #[tokio::test]
    async fn missing_file_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let mut producer = JsonLinesProducer::new("file", dir.path().join("absent.jsonl"));
        let err = producer.connect().await.unwrap_err();
        assert!(err.to_string().contains("absent.jsonl"));
    }
}
