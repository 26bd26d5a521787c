//! Per-device reconciliation.
//!
//! One invocation per device identifier: fetch the raw payload, look up the
//! prior record, decode, then make exactly one store write. Three terminal
//! outcomes: replace an existing record, create a missing one, or mark the
//! record corrupt when the payload does not decode. A transport failure is
//! the only path with no write at all.
//!
//! Display-name policy (deliberately asymmetric, do not "fix"):
//! - prior record exists and the new feed is empty: keep the prior name;
//! - no prior record and the new feed is empty: empty string, no fallback;
//! - non-empty feed: first reading's name wins, regardless of prior state.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::feed;
use crate::store::{DeviceRecord, RecordStore, StoreError};
use crate::telemetry::TelemetryClient;

/// Errors terminating a reconcile invocation. Each is scoped to one device
/// identifier and never aborts the rest of a pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The telemetry fetch did not complete. No store write happened.
    #[error("fetching telemetry for {device_id}: {source}")]
    Transport {
        device_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A create-if-absent lost a race with a concurrent invocation. Not
    /// retried; the winning write stands.
    #[error("record for {device_id} was created concurrently")]
    CreateConflict { device_id: String },

    /// Any other store-layer failure; this identifier's write is lost for
    /// the pass.
    #[error("store operation for {device_id}: {source}")]
    Store {
        device_id: String,
        #[source]
        source: StoreError,
    },
}

/// Which terminal branch a reconcile invocation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Decode succeeded and an existing record was replaced.
    Replaced,
    /// Decode succeeded and a missing record was created.
    Created,
    /// Decode failed; the record was rewritten with the corrupt flag set.
    MarkedCorrupt,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replaced => "replaced",
            Self::Created => "created",
            Self::MarkedCorrupt => "marked-corrupt",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciler drives the fetch, lookup, decode, write cycle for single
/// device identifiers.
pub struct Reconciler<C, S> {
    client: C,
    store: S,
}

impl<C: TelemetryClient, S: RecordStore> Reconciler<C, S> {
    pub fn new(client: C, store: S) -> Self {
        Self { client, store }
    }

    /// Shared store access, for callers that own the reconciler.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one reconcile invocation for `device_id`.
    pub async fn reconcile(&self, device_id: &str) -> Result<Outcome, ReconcileError> {
        // 1. Fetch the raw payload. Failure here is terminal: no write.
        let raw = self.client.fetch_raw(device_id).await.map_err(|source| {
            ReconcileError::Transport {
                device_id: device_id.to_string(),
                source,
            }
        })?;

        // 2. Look up the prior record. Absence is a branch, not an error.
        let prior = match self.store.get(device_id).await {
            Ok(record) => Some(record),
            Err(StoreError::NotFound { .. }) => None,
            Err(source) => {
                return Err(ReconcileError::Store {
                    device_id: device_id.to_string(),
                    source,
                })
            }
        };

        // 3. Decode, then take exactly one write.
        match feed::parse(&raw) {
            Ok(new_feed) => self.write_live(device_id, new_feed, prior).await,
            Err(decode_err) => {
                warn!(
                    device_id = %device_id,
                    error = %decode_err,
                    "payload failed to decode, marking record corrupt",
                );
                self.write_corrupt(device_id).await
            }
        }
    }

    /// Success path: derive the display name and replace or create.
    async fn write_live(
        &self,
        device_id: &str,
        new_feed: feed::TelemetryFeed,
        prior: Option<DeviceRecord>,
    ) -> Result<Outcome, ReconcileError> {
        match prior {
            Some(prior) => {
                // Only this branch may preserve a previous display name.
                let site_name = match new_feed.first_reading_name() {
                    Some(name) => name.to_string(),
                    None => prior.site_name,
                };

                let record = DeviceRecord::live(device_id, new_feed, site_name);
                self.store
                    .replace(device_id, &record)
                    .await
                    .map_err(|source| ReconcileError::Store {
                        device_id: device_id.to_string(),
                        source,
                    })?;

                info!(device_id = %device_id, site_name = %record.site_name, "record replaced");
                Ok(Outcome::Replaced)
            }
            None => {
                let site_name = new_feed.first_reading_name().unwrap_or("").to_string();

                let record = DeviceRecord::live(device_id, new_feed, site_name);
                match self.store.create_if_absent(device_id, &record).await {
                    Ok(_) => {
                        info!(device_id = %device_id, site_name = %record.site_name, "record created");
                        Ok(Outcome::Created)
                    }
                    Err(StoreError::AlreadyExists { .. }) => {
                        Err(ReconcileError::CreateConflict {
                            device_id: device_id.to_string(),
                        })
                    }
                    Err(source) => Err(ReconcileError::Store {
                        device_id: device_id.to_string(),
                        source,
                    }),
                }
            }
        }
    }

    /// Decode-failure path: upsert a corrupt marker, dropping any previous
    /// feed content.
    async fn write_corrupt(&self, device_id: &str) -> Result<Outcome, ReconcileError> {
        let record = DeviceRecord::corrupt(device_id);

        self.store
            .replace(device_id, &record)
            .await
            .map_err(|source| ReconcileError::Store {
                device_id: device_id.to_string(),
                source,
            })?;

        debug!(device_id = %device_id, "corrupt marker written");
        Ok(Outcome::MarkedCorrupt)
    }
}
