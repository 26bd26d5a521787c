//! Telemetry feed decoding.
//!
//! Decodes raw response bodies from the telemetry API into a typed
//! [`TelemetryFeed`]. A feed with zero readings is a valid decode result;
//! only a payload that is not well-formed feed JSON yields [`DecodeError`].
//! Decode failure is its own error type so callers can never confuse it
//! with a transport or store failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding a telemetry payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not a valid telemetry feed: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

/// Latest-readings document for one device, as served by the telemetry API.
///
/// All fields are defaulted: the upstream omits fields freely, and a device
/// with no recent data legitimately serves an empty `feeds` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFeed {
    /// Device identifier as reported by the upstream (not validated against
    /// the identifier that was requested).
    #[serde(default)]
    pub device_id: String,

    /// Upstream data source tag.
    #[serde(default)]
    pub source: String,

    /// Ordered readings, newest first. May be empty.
    #[serde(default)]
    pub feeds: Vec<FeedEntry>,
}

/// One element of the `feeds` array. The upstream nests every reading under
/// a sensor-family key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(rename = "AirBox", default)]
    pub airbox: Reading,
}

/// A single timestamped sensor sample.
///
/// Only `name` is consumed by the reconciler; the remaining fields pass
/// through to the persisted record untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(default)]
    pub timestamp: String,

    #[serde(rename = "siteName", default)]
    pub site_name: String,

    #[serde(default)]
    pub area: String,

    #[serde(rename = "device_ID", default)]
    pub device_id: String,

    /// Human-readable station name; becomes the record's display name.
    #[serde(default)]
    pub name: String,

    /// Particulate matter channel (PM2.5).
    #[serde(rename = "s_d1", default)]
    pub pm25: f64,

    /// Relative humidity channel.
    #[serde(rename = "s_h0", default)]
    pub humidity: f64,

    /// Temperature channel.
    #[serde(rename = "s_t0", default)]
    pub temperature: f64,
}

impl TelemetryFeed {
    /// Name of the first reading, if the feed has any readings at all.
    pub fn first_reading_name(&self) -> Option<&str> {
        self.feeds.first().map(|entry| entry.airbox.name.as_str())
    }
}

/// Decode a raw telemetry payload into a [`TelemetryFeed`].
pub fn parse(raw: &str) -> Result<TelemetryFeed, DecodeError> {
    serde_json::from_str(raw).map_err(|source| DecodeError::Malformed { source })
}
