use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::attendance::domain::record_store::{NewRecord, PersistedRecord, RecordKey, RecordStore};
use crate::shared::BoxError;

/// Mutex-guarded map. Used by tests and dry runs.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<BTreeMap<RecordKey, PersistedRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn exists(&self, key: &RecordKey) -> Result<bool, BoxError> {
        let records = self.records.lock().map_err(|e| format!("store lock poisoned: {e}"))?;
        Ok(records.contains_key(key))
    }

    fn create(&self, record: NewRecord) -> Result<Option<PersistedRecord>, BoxError> {
        let mut records = self.records.lock().map_err(|e| format!("store lock poisoned: {e}"))?;
        if records.contains_key(&record.key) {
            return Ok(None);
        }
        let key = record.key.clone();
        let stored = PersistedRecord::from_new(record, Utc::now());
        records.insert(key, stored.clone());
        Ok(Some(stored))
    }

    fn records(&self) -> Result<Vec<PersistedRecord>, BoxError> {
        let records = self.records.lock().map_err(|e| format!("store lock poisoned: {e}"))?;
        Ok(records.values().cloned().collect())
    }
}
