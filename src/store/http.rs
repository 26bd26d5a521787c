//! HTTP-backed record store.
//!
//! Talks to a REST document store that exposes one resource per partition:
//! `GET`/`PUT`/`POST {endpoint}/partitions/{id}/record`. Status codes carry
//! the store's outcome taxonomy: 404 means the partition is empty, 409
//! means a create lost a race, anything else non-2xx means the store is
//! unavailable for this operation.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::config::StoreConfig;

use super::{DeviceRecord, RecordStore, StoreError};

/// REST document-store client implementing [`RecordStore`].
pub struct HttpStore {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpStore {
    /// Create a new store client from configuration.
    pub fn new(cfg: &StoreConfig) -> Result<Self> {
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            cfg.timeout
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Resource URL for one partition's record.
    fn record_url(&self, id: &str) -> String {
        format!("{}/partitions/{}/record", self.endpoint, id)
    }

    /// Decode a committed record from a 2xx response body.
    async fn decode_committed(response: reqwest::Response) -> Result<DeviceRecord, StoreError> {
        response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable {
                source: anyhow!(e).context("decoding committed record"),
            })
    }
}

impl RecordStore for HttpStore {
    async fn get(&self, id: &str) -> Result<DeviceRecord, StoreError> {
        let url = self.record_url(id);
        debug!(device_id = %id, "store get");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Unavailable {
                source: anyhow!(e).context(format!("requesting {url}")),
            })?;

        let status = response.status();
        if status.is_success() {
            Self::decode_committed(response).await
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(StoreError::NotFound { id: id.to_string() })
        } else {
            Err(unexpected_status(status, &url))
        }
    }

    async fn replace(&self, id: &str, record: &DeviceRecord) -> Result<DeviceRecord, StoreError> {
        let url = self.record_url(id);
        debug!(device_id = %id, "store replace");

        let response = self
            .http
            .put(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable {
                source: anyhow!(e).context(format!("requesting {url}")),
            })?;

        let status = response.status();
        if status.is_success() {
            Self::decode_committed(response).await
        } else {
            Err(unexpected_status(status, &url))
        }
    }

    async fn create_if_absent(
        &self,
        id: &str,
        record: &DeviceRecord,
    ) -> Result<DeviceRecord, StoreError> {
        let url = self.record_url(id);
        debug!(device_id = %id, "store create");

        let response = self
            .http
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable {
                source: anyhow!(e).context(format!("requesting {url}")),
            })?;

        let status = response.status();
        if status.is_success() {
            Self::decode_committed(response).await
        } else if status == reqwest::StatusCode::CONFLICT {
            Err(StoreError::AlreadyExists { id: id.to_string() })
        } else {
            Err(unexpected_status(status, &url))
        }
    }
}

/// Map a non-2xx status outside the taxonomy to [`StoreError::Unavailable`].
fn unexpected_status(status: reqwest::StatusCode, url: &str) -> StoreError {
    StoreError::Unavailable {
        source: anyhow!("unexpected status {status} from {url}"),
    }
}
