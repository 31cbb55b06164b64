//! Dockhand API integration module.
//!
//! The reconciliation engine talks to Dockhand only through the [`Gateway`]
//! trait. [`DockhandClient`] is the HTTP implementation; tests substitute a
//! mock.

mod client;
mod health;
mod inventory;
mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GatewayError;
use crate::resource::{Action, ResourceKind};

pub use client::DockhandClient;
pub use health::{HealthChecker, HealthStatus};
pub use inventory::Inventory;
pub use types::{ImageAuth, ImagePullRequest, InventoryItem};

/// Result of a Gateway call.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Typed CRUD surface of the Dockhand API.
///
/// Objects travel as raw JSON so the engine can distinguish omitted keys
/// from explicit nulls. `environment_id` is ignored for
/// [`ResourceKind::Environment`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Lists every object of a kind in an environment.
    async fn list(&self, kind: ResourceKind, environment_id: &str) -> GatewayResult<Vec<Value>>;

    /// Fetches a single object.
    async fn get(&self, kind: ResourceKind, environment_id: &str, id: &str)
    -> GatewayResult<Value>;

    /// Creates an object and returns the server's view of it.
    async fn create(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        body: &Value,
    ) -> GatewayResult<Value>;

    /// Updates an object and returns the server's view of it.
    async fn update(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
        body: &Value,
    ) -> GatewayResult<Value>;

    /// Deletes an object.
    async fn delete(&self, kind: ResourceKind, environment_id: &str, id: &str)
    -> GatewayResult<()>;

    /// Runs a lifecycle action on an object.
    async fn action(
        &self,
        kind: ResourceKind,
        environment_id: &str,
        id: &str,
        action: Action,
    ) -> GatewayResult<()>;

    /// Asks the environment to pull an image.
    async fn pull_image(
        &self,
        environment_id: &str,
        request: &ImagePullRequest,
    ) -> GatewayResult<()>;

    /// Probes the API health endpoint.
    async fn health_check(&self) -> GatewayResult<bool>;
}
