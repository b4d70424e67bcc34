//! LogDatabase - logs stored records via tracing

use contracts::{ContractError, Report, ReportDatabase, ReportModel};
use tracing::{info, instrument};

/// Database that only logs records, for debugging
pub struct LogDatabase {
    name: String,
    saved: u64,
}

impl LogDatabase {
    /// Create a new LogDatabase with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            saved: 0,
        }
    }
}

impl ReportDatabase for LogDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(
        name = "log_database_save",
        skip(self, report),
        fields(database = %self.name, sensor = %report.sensor, target = %report.target)
    )]
    async fn save(&mut self, report: &Report, model: ReportModel) -> Result<(), ContractError> {
        let record = model.to_record(report)?;
        self.saved += 1;
        info!(%record, "Report stored");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log database
        Ok(())
    }

    #[instrument(name = "log_database_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(database = %self.name, saved = self.saved, "LogDatabase closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::ReportPayload;

    #[tokio::test]
    async fn model_mismatch_is_a_database_error() {
        let mut db = LogDatabase::new("log");
        db.connect().await.unwrap();
        let power = Report::new(Utc::now(), "s", "t", ReportPayload::Power { power: 2.0 });

        assert!(db.save(&power, ReportModel::Power).await.is_ok());
        let err = db.save(&power, ReportModel::Hwpc).await.unwrap_err();
        assert!(matches!(err, ContractError::Database { .. }));
    }
}
