//! Telemetry API client.
//!
//! Fetches the raw latest-readings payload for one device identifier. No
//! parsing happens here; the body comes back as received so the feed
//! decoder can classify it. Transport errors and non-2xx statuses both
//! surface as fetch failures.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::TelemetryConfig;

/// Placeholder substituted with the device identifier in the endpoint
/// template.
pub const DEVICE_ID_PLACEHOLDER: &str = "{device_id}";

/// Telemetry API client trait.
pub trait TelemetryClient: Send + Sync {
    /// Fetch the raw payload for one device identifier.
    fn fetch_raw(
        &self,
        device_id: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// HTTP-based telemetry API client.
pub struct Client {
    http: reqwest::Client,
    endpoint_template: String,
}

impl Client {
    /// Create a new telemetry client.
    pub fn new(cfg: &TelemetryConfig) -> Result<Self> {
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
            endpoint_template: cfg.endpoint_template.clone(),
        })
    }

    /// Expand the endpoint template for one device identifier.
    fn device_url(&self, device_id: &str) -> String {
        self.endpoint_template
            .replace(DEVICE_ID_PLACEHOLDER, device_id)
    }
}

impl TelemetryClient for Client {
    async fn fetch_raw(&self, device_id: &str) -> Result<String> {
        let url = self.device_url(device_id);
        debug!(device_id = %device_id, url = %url, "fetching telemetry");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("requesting telemetry for {device_id}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("unexpected status {status} fetching telemetry for {device_id}");
        }

        response
            .text()
            .await
            .with_context(|| format!("reading telemetry body for {device_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;

    fn client(template: &str) -> Client {
        Client::new(&TelemetryConfig {
            endpoint_template: template.to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("client should build")
    }

    #[test]
    fn test_device_url_substitution() {
        let client = client("https://pm25.lass-net.org/API-1.0.0/device/{device_id}/latest/?format=JSON");
        assert_eq!(
            client.device_url("74DA38F7534E"),
            "https://pm25.lass-net.org/API-1.0.0/device/74DA38F7534E/latest/?format=JSON"
        );
    }

    #[test]
    fn test_device_url_without_placeholder_is_unchanged() {
        let client = client("https://example.com/latest");
        assert_eq!(client.device_url("X"), "https://example.com/latest");
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let cfg = TelemetryConfig {
            endpoint_template: "https://example.com/{device_id}".to_string(),
            timeout: Duration::ZERO,
        };
        assert!(Client::new(&cfg).is_ok());
    }
}
