//! Device directory.
//!
//! The directory is one well-known record mapping site labels to device
//! identifiers. Its value set, in record order, is the fan-out list for a
//! sync pass. Order is a property of the stored data (an ordered array of
//! entries), and duplicate device identifiers across labels are kept:
//! each one fans out independently.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or validating the directory record.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("reading directory record at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("directory record is not valid JSON: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },

    #[error("directory record id {actual:?} does not match expected {expected:?}")]
    WrongRecord { expected: String, actual: String },
}

/// One site entry: a human label and the device identifier monitored there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteEntry {
    pub label: String,

    #[serde(rename = "deviceId")]
    pub device_id: String,
}

/// The persisted directory record, keyed by a well-known identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub id: String,

    #[serde(rename = "partitionKey")]
    pub partition_key: String,

    #[serde(default)]
    pub sites: Vec<SiteEntry>,
}

/// Ordered label-to-device mapping for one sync pass.
///
/// Immutable once built; the directory collaborator refreshes it by
/// supplying a new record, never by mutating this one.
#[derive(Debug, Clone, Default)]
pub struct DeviceDirectory {
    sites: Vec<SiteEntry>,
}

impl DeviceDirectory {
    pub fn new(sites: Vec<SiteEntry>) -> Self {
        Self { sites }
    }

    /// Parse a directory record from raw JSON and check it is the expected
    /// well-known record.
    pub fn from_record_json(raw: &str, expected_id: &str) -> Result<Self, DirectoryError> {
        let record: DirectoryRecord =
            serde_json::from_str(raw).map_err(|source| DirectoryError::Malformed { source })?;

        if record.id != expected_id {
            return Err(DirectoryError::WrongRecord {
                expected: expected_id.to_string(),
                actual: record.id,
            });
        }

        Ok(Self::new(record.sites))
    }

    /// Load the directory record from a JSON file.
    pub fn load(path: &Path, expected_id: &str) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DirectoryError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_record_json(&raw, expected_id)
    }

    /// Device identifiers in record order, duplicates included.
    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.sites.iter().map(|entry| entry.device_id.as_str())
    }

    /// Site entries in record order.
    pub fn sites(&self) -> &[SiteEntry] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{
        "id": "devices",
        "partitionKey": "devices",
        "sites": [
            {"label": "WaterTower_Left", "deviceId": "74DA38F7534E"},
            {"label": "WaterTower_Right", "deviceId": "74DA38F7AA10"},
            {"label": "Gym", "deviceId": "74DA38F7534E"}
        ]
    }"#;

    #[test]
    fn test_device_ids_in_record_order() {
        let dir = DeviceDirectory::from_record_json(RECORD, "devices").expect("should parse");
        let ids: Vec<&str> = dir.device_ids().collect();
        assert_eq!(ids, ["74DA38F7534E", "74DA38F7AA10", "74DA38F7534E"]);
    }

    #[test]
    fn test_duplicate_device_ids_are_kept() {
        let dir = DeviceDirectory::from_record_json(RECORD, "devices").expect("should parse");
        assert_eq!(dir.len(), 3);
        assert_eq!(dir.device_ids().filter(|id| *id == "74DA38F7534E").count(), 2);
    }

    #[test]
    fn test_wrong_record_id_rejected() {
        let err = DeviceDirectory::from_record_json(RECORD, "other").expect_err("should reject");
        assert!(matches!(err, DirectoryError::WrongRecord { .. }));
    }

    #[test]
    fn test_malformed_record_rejected() {
        let err =
            DeviceDirectory::from_record_json("not json", "devices").expect_err("should reject");
        assert!(matches!(err, DirectoryError::Malformed { .. }));
    }

    #[test]
    fn test_missing_sites_defaults_to_empty() {
        let dir = DeviceDirectory::from_record_json(
            r#"{"id": "devices", "partitionKey": "devices"}"#,
            "devices",
        )
        .expect("should parse");
        assert!(dir.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("devices.json");
        std::fs::write(&path, RECORD).expect("write record");

        let loaded = DeviceDirectory::load(&path, "devices").expect("should load");
        assert_eq!(loaded.len(), 3);

        let missing = DeviceDirectory::load(&dir.path().join("nope.json"), "devices");
        assert!(matches!(missing, Err(DirectoryError::Io { .. })));
    }
}
