//! Partitioned device-record persistence.
//!
//! The store holds one [`DeviceRecord`] per device identifier, with the
//! identifier doubling as the partition key. Writes are atomic per
//! partition; nothing here coordinates across partitions.

pub mod http;
pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feed::TelemetryFeed;

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Errors surfaced by record store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no record in partition {id}")]
    NotFound { id: String },

    #[error("partition {id} already holds a record")]
    AlreadyExists { id: String },

    #[error("store unavailable: {source}")]
    Unavailable {
        #[source]
        source: anyhow::Error,
    },
}

/// Persisted record for one monitored device.
///
/// Serialized field names match the store's document format: `id` and
/// `partitionKey` are the two required identity fields and are always equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,

    #[serde(rename = "partitionKey")]
    pub partition_key: String,

    /// Latest decoded feed; absent until the first successful fetch and
    /// dropped again whenever the upstream payload fails to decode.
    #[serde(default)]
    pub airbox: Option<TelemetryFeed>,

    /// Derived human-readable site name.
    #[serde(rename = "siteName", default)]
    pub site_name: String,

    /// True only when the most recent fetch produced an unparsable payload.
    #[serde(rename = "jsonIsBroken", default)]
    pub json_is_broken: bool,
}

impl DeviceRecord {
    /// Record for a successfully decoded feed.
    pub fn live(device_id: &str, feed: TelemetryFeed, site_name: String) -> Self {
        Self {
            id: device_id.to_string(),
            partition_key: device_id.to_string(),
            airbox: Some(feed),
            site_name,
            json_is_broken: false,
        }
    }

    /// Record marking the device's latest payload as unparsable. Carries no
    /// feed content; corruption replaces, it is never merged.
    pub fn corrupt(device_id: &str) -> Self {
        Self {
            id: device_id.to_string(),
            partition_key: device_id.to_string(),
            airbox: None,
            site_name: String::new(),
            json_is_broken: true,
        }
    }
}

/// Record store capability, partitioned by device identifier.
pub trait RecordStore: Send + Sync {
    /// Point lookup of the record in partition `id`.
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<DeviceRecord, StoreError>> + Send;

    /// Full replace of partition `id`. Creates the partition if it does not
    /// exist (upsert semantics).
    fn replace(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> impl std::future::Future<Output = Result<DeviceRecord, StoreError>> + Send;

    /// Create the record in partition `id`, failing with
    /// [`StoreError::AlreadyExists`] if the partition is occupied.
    fn create_if_absent(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> impl std::future::Future<Output = Result<DeviceRecord, StoreError>> + Send;
}

/// Store backend selected at runtime from configuration.
///
/// Uses enum dispatch rather than trait objects for zero-cost async
/// dispatch (avoids `Pin<Box<dyn Future>>` overhead on every store call).
pub enum Backend {
    Memory(MemoryStore),
    Http(HttpStore),
}

impl RecordStore for Backend {
    async fn get(&self, id: &str) -> Result<DeviceRecord, StoreError> {
        match self {
            Self::Memory(s) => s.get(id).await,
            Self::Http(s) => s.get(id).await,
        }
    }

    async fn replace(&self, id: &str, record: &DeviceRecord) -> Result<DeviceRecord, StoreError> {
        match self {
            Self::Memory(s) => s.replace(id, record).await,
            Self::Http(s) => s.replace(id, record).await,
        }
    }

    async fn create_if_absent(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> Result<DeviceRecord, StoreError> {
        match self {
            Self::Memory(s) => s.create_if_absent(id, record).await,
            Self::Http(s) => s.create_if_absent(id, record).await,
        }
    }
}
