//! MemoryDatabase - shared in-memory store

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use contracts::{ContractError, Report, ReportDatabase, ReportModel};
use serde_json::Value;

/// Records shared between a database and whoever inspects it.
///
/// Failures can be scripted: the next `n` saves fail with a database error.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Value>>,
    failing_saves: AtomicUsize,
    refuse_connect: AtomicBool,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Process-wide store registered under `key`, created on first use
    pub fn shared(key: &str) -> Arc<Self> {
        static STORES: OnceLock<Mutex<HashMap<String, Arc<MemoryStore>>>> = OnceLock::new();
        let stores = STORES.get_or_init(Default::default);
        let mut stores = stores.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(stores.entry(key.to_string()).or_insert_with(MemoryStore::new))
    }

    pub fn records(&self) -> Vec<Value> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Make the next `count` saves fail
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Make `connect` fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Value>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Database writing into a [`MemoryStore`]
pub struct MemoryDatabase {
    name: String,
    store: Arc<MemoryStore>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>, store: Arc<MemoryStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl ReportDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), ContractError> {
        if self.store.refuse_connect.load(Ordering::SeqCst) {
            return Err(ContractError::database(format!("{}: connection refused", self.name)));
        }
        self.store.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&mut self, report: &Report, model: ReportModel) -> Result<(), ContractError> {
        if self.store.take_failure() {
            return Err(ContractError::database(format!("{}: scripted save failure", self.name)));
        }
        let record = model.to_record(report)?;
        self.store.lock().push(record);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.store.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::ReportPayload;

    #[tokio::test]
    async fn scripted_failures_are_consumed() {
        let store = MemoryStore::new();
        let mut db = MemoryDatabase::new("mem", Arc::clone(&store));
        db.connect().await.unwrap();
        store.fail_next_saves(1);

        let report = Report::new(Utc::now(), "s", "t", ReportPayload::Power { power: 1.0 });
        assert!(db.save(&report, ReportModel::Power).await.is_err());
        assert!(db.save(&report, ReportModel::Power).await.is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn shared_store_is_reused() {
        let a = MemoryStore::shared("memory-test-shared");
        let b = MemoryStore::shared("memory-test-shared");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
