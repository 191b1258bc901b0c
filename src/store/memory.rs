//! Process-local breaker store.

use super::{BreakerRecord, BreakerStore, SaveOutcome};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// An in-memory store: a mutex-guarded map from `(resource_key, namespace)`
/// to records. `compare_and_save` is a single critical section. Records live
/// for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, String), BreakerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), BreakerRecord>> {
        // A poisoned map still holds fully committed records; writes are
        // whole-record replacements.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BreakerStore for MemoryStore {
    async fn load(
        &self,
        resource_key: &str,
        namespace: &str,
        window_capacity: usize,
    ) -> Result<BreakerRecord, StoreError> {
        let mut records = self.lock();
        let record = records
            .entry((resource_key.to_owned(), namespace.to_owned()))
            .or_insert_with(|| BreakerRecord::new(window_capacity));
        Ok(record.clone())
    }

    async fn compare_and_save(
        &self,
        resource_key: &str,
        namespace: &str,
        expected_version: u64,
        record: &BreakerRecord,
    ) -> Result<SaveOutcome, StoreError> {
        let mut records = self.lock();
        let slot = records
            .entry((resource_key.to_owned(), namespace.to_owned()))
            .or_insert_with(|| BreakerRecord::new(record.history.capacity()));

        if slot.version != expected_version {
            return Ok(SaveOutcome::Conflict);
        }

        let mut committed = record.clone();
        committed.version = expected_version + 1;
        committed.updated_at = Utc::now();
        *slot = committed;
        Ok(SaveOutcome::Committed)
    }
}
