//! Read-only inventory of objects known to Dockhand.
//!
//! Lists any kind in an environment, including objects not managed by the
//! local configuration.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ReconcileError, Operation};
use crate::resource::{
    ComposeStack, Container, Environment, Image, Network, ResourceKind, Volume, from_object,
};

use super::Gateway;
use super::types::InventoryItem;

/// Inventory of remote objects.
#[derive(Debug)]
pub struct Inventory<G> {
    /// Gateway used for listing.
    gateway: G,
}

impl<G: Gateway> Inventory<G> {
    /// Creates a new inventory.
    #[must_use]
    pub const fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Lists objects of one kind.
    ///
    /// Image pulls are listed as the images they produced.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails or an object is malformed.
    pub async fn list(
        &self,
        kind: ResourceKind,
        environment_id: &str,
    ) -> Result<Vec<InventoryItem>, ReconcileError> {
        let kind = if kind == ResourceKind::ImagePull {
            ResourceKind::Image
        } else {
            kind
        };
        info!("Listing {kind} objects in environment '{environment_id}'");

        let objects = self
            .gateway
            .list(kind, environment_id)
            .await
            .map_err(|e| ReconcileError::from_gateway(Operation::Read, kind, e))?;

        let items = objects
            .into_iter()
            .map(|object| summarize(kind, object))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Found {} {kind} objects", items.len());
        Ok(items)
    }

    /// Lists every environment-scoped kind in one environment.
    ///
    /// # Errors
    ///
    /// Returns an error on the first failing listing.
    pub async fn list_environment(
        &self,
        environment_id: &str,
    ) -> Result<Vec<InventoryItem>, ReconcileError> {
        let mut items = Vec::new();
        for kind in [
            ResourceKind::Network,
            ResourceKind::Volume,
            ResourceKind::Image,
            ResourceKind::ComposeStack,
            ResourceKind::Container,
        ] {
            items.extend(self.list(kind, environment_id).await?);
        }
        Ok(items)
    }
}

/// Builds a summary row from a raw object.
fn summarize(kind: ResourceKind, object: Value) -> Result<InventoryItem, ReconcileError> {
    let (id, name, detail) = match kind {
        ResourceKind::Container => {
            let c: Container = from_object(kind, object)?;
            let state = c.state.unwrap_or_else(|| String::from("unknown"));
            let detail = format!("{} ({state})", c.image);
            (c.id, c.name, detail)
        }
        ResourceKind::ComposeStack => {
            let s: ComposeStack = from_object(kind, object)?;
            let services = s.services.as_ref().map_or(0, std::collections::BTreeMap::len);
            let detail = format!(
                "{} ({services} services)",
                s.status.unwrap_or_else(|| String::from("unknown"))
            );
            (s.id, s.name, detail)
        }
        ResourceKind::Environment => {
            let e: Environment = from_object(kind, object)?;
            let target = e.host.map_or_else(
                || e.env_type.clone(),
                |host| match e.port {
                    Some(port) => format!("{} {host}:{port}", e.env_type),
                    None => format!("{} {host}", e.env_type),
                },
            );
            let detail = if e.active.unwrap_or(false) {
                format!("{target} (active)")
            } else {
                target
            };
            (e.id, e.name, detail)
        }
        ResourceKind::Network => {
            let n: Network = from_object(kind, object)?;
            let detail = format!(
                "{}/{}",
                n.driver.unwrap_or_default(),
                n.scope.unwrap_or_default()
            );
            (n.id, n.name, detail)
        }
        ResourceKind::Volume => {
            let v: Volume = from_object(kind, object)?;
            let detail = format!(
                "{} {}",
                v.driver.unwrap_or_default(),
                v.mountpoint.unwrap_or_default()
            );
            (v.id, v.name, detail.trim().to_string())
        }
        ResourceKind::Image | ResourceKind::ImagePull => {
            let i: Image = from_object(kind, object)?;
            let tags = i.repo_tags.unwrap_or_default();
            let name = tags.first().cloned().unwrap_or_else(|| i.id.clone());
            (i.id, name, tags.join(", "))
        }
    };

    Ok(InventoryItem {
        kind,
        id,
        name,
        detail,
    })
}
