//! In-process record store.
//!
//! One map entry per partition behind a single async mutex. Fine for the
//! `memory` backend and for tests; every operation clones the record so
//! callers never hold references into the map.

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::{DeviceRecord, RecordStore, StoreError};

/// In-memory partition map implementing [`RecordStore`].
#[derive(Default)]
pub struct MemoryStore {
    partitions: Mutex<HashMap<String, DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied partitions.
    pub async fn len(&self) -> usize {
        self.partitions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.partitions.lock().await.is_empty()
    }
}

impl RecordStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<DeviceRecord, StoreError> {
        self.partitions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn replace(&self, id: &str, record: &DeviceRecord) -> Result<DeviceRecord, StoreError> {
        self.partitions
            .lock()
            .await
            .insert(id.to_string(), record.clone());
        Ok(record.clone())
    }

    async fn create_if_absent(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> Result<DeviceRecord, StoreError> {
        let mut partitions = self.partitions.lock().await;
        if partitions.contains_key(id) {
            return Err(StoreError::AlreadyExists { id: id.to_string() });
        }
        partitions.insert(id.to_string(), record.clone());
        Ok(record.clone())
    }
}
