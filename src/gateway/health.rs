//! Health checking for the Dockhand API.
//!
//! [`Gateway::health_check`](super::Gateway::health_check) answers yes or
//! no; the checker here also reports status code and latency for the CLI.

use reqwest::{Client, Url, header};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::{ConfigError, DockhandError, GatewayError, Result};

/// Default connection timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Path of the health endpoint.
const HEALTH_PATH: &str = "api/health";

/// Outcome of a health probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Probed URL.
    pub url: String,
    /// Whether the API answered 2xx.
    pub healthy: bool,
    /// HTTP status code, if a response arrived.
    pub status_code: Option<u16>,
    /// Response time in milliseconds.
    pub response_time_ms: Option<u64>,
    /// Error message, if any.
    pub error: Option<String>,
}

/// Health checker for the Dockhand API.
#[derive(Debug)]
pub struct HealthChecker {
    /// HTTP client for health checks.
    client: Client,
    /// Health endpoint URL.
    url: Url,
    /// API key.
    api_key: Option<String>,
}

impl HealthChecker {
    /// Creates a new health checker for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or the HTTP client cannot
    /// be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            ConfigError::validation(format!("Invalid endpoint URL: {e}"), "provider.endpoint")
        })?;
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut with_slash = base.clone();
            with_slash.set_path(&format!("{}/", base.path()));
            with_slash
        };
        let url = base.join(HEALTH_PATH).map_err(|e| {
            ConfigError::validation(format!("Invalid endpoint URL: {e}"), "provider.endpoint")
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .map_err(|e| GatewayError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Probes the health endpoint once.
    pub async fn check(&self) -> HealthStatus {
        debug!("Checking Dockhand health at {}", self.url);
        let start = Instant::now();

        let mut request = self.client.get(self.url.clone());
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let response_time = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                let healthy = status.is_success();

                if !healthy {
                    debug!("Health endpoint returned status {status}");
                }

                HealthStatus {
                    url: self.url.to_string(),
                    healthy,
                    status_code: Some(status.as_u16()),
                    response_time_ms: Some(response_time),
                    error: (!healthy).then(|| format!("HTTP {status}")),
                }
            }
            Err(e) => {
                warn!("Health check failed for {}: {e}", self.url);

                HealthStatus {
                    url: self.url.to_string(),
                    healthy: false,
                    status_code: None,
                    response_time_ms: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Polls until the API is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is reached.
    pub async fn wait_for_healthy(
        &self,
        timeout_secs: u64,
        interval_secs: u64,
    ) -> Result<HealthStatus> {
        let start = Instant::now();
        let timeout = Duration::from_secs(timeout_secs);
        let interval = Duration::from_secs(interval_secs.max(1));

        loop {
            let status = self.check().await;

            if status.healthy {
                return Ok(status);
            }

            if start.elapsed() > timeout {
                return Err(DockhandError::Gateway(GatewayError::transport(format!(
                    "Dockhand not healthy after {timeout_secs}s: {}",
                    status.error.unwrap_or_default()
                ))));
            }

            tokio::time::sleep(interval).await;
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.healthy { "healthy" } else { "unhealthy" };
        write!(f, "{}: {status}", self.url)?;

        if let Some(ms) = self.response_time_ms {
            write!(f, " ({ms} ms)")?;
        }

        if let Some(error) = &self.error {
            write!(f, " - {error}")?;
        }

        Ok(())
    }
}
