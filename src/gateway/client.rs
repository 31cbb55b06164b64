//! Dockhand API client implementation.
//!
//! This module provides the HTTP client for the Dockhand REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, Url, header};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ProviderConfig;
use crate::error::{ConfigError, GatewayError, Result};
use crate::resource::{Action, ResourceKind};

use super::types::ImagePullRequest;
use super::{Gateway, GatewayResult};

/// Maximum number of attempts for transport failures.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 500;

/// Dockhand API client.
#[derive(Debug, Clone)]
pub struct DockhandClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the server.
    base_url: Url,
    /// API key.
    api_key: Option<String>,
    /// Session cookie.
    cookie: Option<String>,
}

impl DockhandClient {
    /// Creates a new Dockhand API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid base URL or the HTTP
    /// client cannot be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.endpoint).map_err(|e| {
            ConfigError::validation(format!("Invalid endpoint URL: {e}"), "provider.endpoint")
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::validation(
                "Endpoint URL cannot be used as a base",
                "provider.endpoint",
            )
            .into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .map_err(|e| GatewayError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            cookie: config.cookie.clone().filter(|c| !c.is_empty()),
        })
    }

    /// Returns the base URL of the server.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::transport("endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Returns the collection path of a kind.
    fn collection<'a>(kind: ResourceKind, environment_id: &'a str) -> Vec<&'a str> {
        let mut segments = vec!["api", "environments"];
        if let Some(segment) = kind.path_segment() {
            segments.push(environment_id);
            segments.push(segment);
        }
        segments
    }

    /// Returns the path of a single object.
    fn object<'a>(kind: ResourceKind, environment_id: &'a str, id: &'a str) -> Vec<&'a str> {
        let mut segments = Self::collection(kind, environment_id);
        segments.push(id);
        segments
    }

    /// Executes a request, retrying transport failures.
    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> GatewayResult<Value> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for {method} {url}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.execute_once(method.clone(), url.clone(), body).await {
                Ok(value) => return Ok(value),
                Err(e @ GatewayError::Transport { .. }) => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::transport("Max retries exceeded")))
    }

    /// Executes a single request.
    async fn execute_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> GatewayResult<Value> {
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("Bearer {api_key}"));
        }
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::transport(format!("Request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            debug!("Dockhand answered {status}");
            return Err(GatewayError::from_status(status.as_u16(), text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })
    }

    /// Executes a request whose response must be a JSON object.
    async fn execute_object(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> GatewayResult<Value> {
        let value = self.execute(method, url, body).await?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(GatewayError::InvalidResponse {
                message: format!("Expected a JSON object, got: {value}"),
            })
        }
    }
}

#[async_trait]
impl Gateway for DockhandClient {
    async fn list(&self, kind: ResourceKind, environment_id: &str) -> GatewayResult<Vec<Value>> {
        let url = self.url(&Self::collection(kind, environment_id))?;
        match self.execute(Method::GET, url, None).await? {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Err(GatewayError::InvalidResponse {
                message: format!("Expected a JSON array, got: {other}"),
            }),
        }
    }

    async fn get(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
    ) -> GatewayResult<Value> {
        let url = self.url(&Self::object(kind, environment_id, id))?;
        self.execute_object(Method::GET, url, None).await
    }

    async fn create(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        body: &Value,
    ) -> GatewayResult<Value> {
        let url = self.url(&Self::collection(kind, environment_id))?;
        self.execute_object(Method::POST, url, Some(body)).await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
        body: &Value,
    ) -> GatewayResult<Value> {
        let url = self.url(&Self::object(kind, environment_id, id))?;
        self.execute_object(Method::PUT, url, Some(body)).await
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
    ) -> GatewayResult<()> {
        let url = self.url(&Self::object(kind, environment_id, id))?;
        self.execute(Method::DELETE, url, None).await.map(|_| ())
    }

    async fn action(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
        action: Action,
    ) -> GatewayResult<()> {
        let mut segments = Self::object(kind, environment_id, id);
        segments.push(action.as_str());
        let url = self.url(&segments)?;
        self.execute(Method::POST, url, None).await.map(|_| ())
    }

    async fn pull_image(
        &self,
        environment_id: &str,
        request: &ImagePullRequest,
    ) -> GatewayResult<()> {
        let mut segments = Self::collection(ResourceKind::ImagePull, environment_id);
        segments.push("pull");
        let url = self.url(&segments)?;
        let body = serde_json::to_value(request).map_err(|e| GatewayError::InvalidResponse {
            message: format!("Failed to encode pull request: {e}"),
        })?;
        self.execute(Method::POST, url, Some(&body)).await.map(|_| ())
    }

    async fn health_check(&self) -> GatewayResult<bool> {
        let url = self.url(&["api", "health"])?;
        match self.execute_once(Method::GET, url, None).await {
            Ok(_) => Ok(true),
            Err(GatewayError::Status { .. } | GatewayError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
