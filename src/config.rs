use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::telemetry::DEVICE_ID_PLACEHOLDER;

/// Top-level configuration for the airsyncd daemon.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error), overridable with the
    /// --log-level flag. Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Telemetry API connection configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Device directory configuration.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Sync pass scheduling configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Telemetry API connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// URL template with a `{device_id}` placeholder.
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,

    /// Request timeout. Default: 10s.
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Record store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which store backend to use. Default: memory.
    #[serde(default)]
    pub backend: BackendKind,

    /// Store service base URL (required for the http backend).
    #[serde(default)]
    pub endpoint: String,

    /// Request timeout for store operations. Default: 10s.
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Store backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    Http,
}

/// Device directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Path to the JSON file holding the directory record.
    #[serde(default)]
    pub path: PathBuf,

    /// Well-known id the directory record must carry. Default: "devices".
    #[serde(default = "default_directory_record_id")]
    pub record_id: String,
}

/// Sync pass scheduling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Interval between pass launches. Default: 5m.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Wait for each pass to finish before the next tick instead of
    /// detaching it. Default: false (fire-and-forget).
    #[serde(default)]
    pub await_passes: bool,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_endpoint_template() -> String {
    "https://pm25.lass-net.org/API-1.0.0/device/{device_id}/latest/?format=JSON".to_string()
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_directory_record_id() -> String {
    "devices".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(300)
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            timeout: default_http_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            endpoint: String::new(),
            timeout: default_http_timeout(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            record_id: default_directory_record_id(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            await_passes: false,
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.telemetry.endpoint_template.is_empty() {
            bail!("telemetry.endpoint_template is required");
        }

        if !self
            .telemetry
            .endpoint_template
            .contains(DEVICE_ID_PLACEHOLDER)
        {
            bail!(
                "telemetry.endpoint_template must contain the {DEVICE_ID_PLACEHOLDER} placeholder"
            );
        }

        if self.store.backend == BackendKind::Http && self.store.endpoint.is_empty() {
            bail!("store.endpoint is required for the http backend");
        }

        if self.directory.path.as_os_str().is_empty() {
            bail!("directory.path is required");
        }

        if self.directory.record_id.is_empty() {
            bail!("directory.record_id must not be empty");
        }

        if self.sync.poll_interval.is_zero() {
            bail!("sync.poll_interval must be positive");
        }

        Ok(())
    }
}
