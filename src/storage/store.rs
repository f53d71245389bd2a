//! Key-value projection store: upsert-by-key plus conditional update on the
//! record version. The production target is an external document store; the
//! in-memory implementation backs tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use super::record::StorageProjection;
use super::StorageError;

pub trait ProjectionStore {
    fn get(&self, key: &str) -> Result<Option<StorageProjection>, StorageError>;

    /// Unconditional write of the full record. Idempotent by key.
    fn upsert(&self, projection: &StorageProjection) -> Result<(), StorageError>;

    /// Write only if the stored `record_version` still equals
    /// `expected_version`; the written record carries `expected_version + 1`.
    fn update_if_version(
        &self,
        projection: &StorageProjection,
        expected_version: u64,
    ) -> Result<(), StorageError>;
}

impl<T: ProjectionStore + ?Sized> ProjectionStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<StorageProjection>, StorageError> {
        (**self).get(key)
    }

    fn upsert(&self, projection: &StorageProjection) -> Result<(), StorageError> {
        (**self).upsert(projection)
    }

    fn update_if_version(
        &self,
        projection: &StorageProjection,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        (**self).update_if_version(projection, expected_version)
    }
}

/// Mutex-guarded map with full-record semantics; never a partial write.
#[derive(Default)]
pub struct InMemoryProjectionStore {
    records: Mutex<HashMap<String, StorageProjection>>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProjectionStore for InMemoryProjectionStore {
    fn get(&self, key: &str) -> Result<Option<StorageProjection>, StorageError> {
        let records = self.records.lock().expect("store mutex poisoned");
        Ok(records.get(key).cloned())
    }

    fn upsert(&self, projection: &StorageProjection) -> Result<(), StorageError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.insert(projection.audio_key.clone(), projection.clone());
        Ok(())
    }

    fn update_if_version(
        &self,
        projection: &StorageProjection,
        expected_version: u64,
    ) -> Result<(), StorageError> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let current = records
            .get(&projection.audio_key)
            .ok_or_else(|| StorageError::NotFound(projection.audio_key.clone()))?;

        if current.record_version != expected_version {
            return Err(StorageError::Conflict {
                key: projection.audio_key.clone(),
                expected: expected_version,
                found: current.record_version,
            });
        }

        let mut updated = projection.clone();
        updated.record_version = expected_version + 1;
        records.insert(updated.audio_key.clone(), updated);
        Ok(())
    }
}
