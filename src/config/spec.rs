//! Configuration file types.
//!
//! This module defines the structs that map to the `dockhand.yaml` file.
//! Resources are declared per kind in maps keyed by a local name; together
//! with the kind that name forms the resource address (`container.web`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::{
    ComposeStack, Container, Environment, Image, ImagePull, Network, ResourceKind, ResourceRecord,
    Volume,
};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default location of the state file.
pub const DEFAULT_STATE_PATH: &str = ".dockhand/state.json";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DockhandConfig {
    /// Dockhand API connection.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// State file configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Environments to manage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, Environment>,
    /// Networks to manage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, Network>,
    /// Volumes to manage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Volume>,
    /// Images to adopt.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<String, Image>,
    /// Images to pull.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub image_pulls: BTreeMap<String, ImagePull>,
    /// Compose stacks to manage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub compose_stacks: BTreeMap<String, ComposeStack>,
    /// Containers to manage.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<String, Container>,
}

/// Dockhand API connection settings.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the Dockhand server.
    #[serde(default)]
    pub endpoint: String,
    /// API key, sent as a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Session cookie, sent verbatim in the `Cookie` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub tls_skip_verify: bool,
}

/// State file configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Path of the local state file.
    #[serde(default = "default_state_path")]
    pub path: String,
}

/// A desired resource bound to its address.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    /// Resource address (`<kind>.<name>`).
    pub address: String,
    /// Desired record.
    pub record: ResourceRecord,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_state_path() -> String {
    String::from(DEFAULT_STATE_PATH)
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            cookie: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            tls_skip_verify: false,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("cookie", &self.cookie.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("tls_skip_verify", &self.tls_skip_verify)
            .finish()
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

/// Builds a resource address from a kind and a local name.
#[must_use]
pub fn address(kind: ResourceKind, name: &str) -> String {
    format!("{kind}.{name}")
}

/// Splits a resource address into kind and local name.
#[must_use]
pub fn parse_address(address: &str) -> Option<(ResourceKind, &str)> {
    let (kind, name) = address.split_once('.')?;
    let kind = kind.parse().ok()?;
    (!name.is_empty()).then_some((kind, name))
}

impl DockhandConfig {
    /// Returns every desired resource, in apply order.
    #[must_use]
    pub fn desired_resources(&self) -> Vec<DesiredResource> {
        fn bind<T: Clone>(
            kind: ResourceKind,
            map: &BTreeMap<String, T>,
            wrap: fn(T) -> ResourceRecord,
        ) -> impl Iterator<Item = DesiredResource> + '_ {
            map.iter().map(move |(name, record)| DesiredResource {
                address: address(kind, name),
                record: wrap(record.clone()),
            })
        }

        let mut resources = Vec::with_capacity(self.resource_count());
        for kind in ResourceKind::ALL {
            match kind {
                ResourceKind::Environment => resources.extend(bind(
                    kind,
                    &self.environments,
                    ResourceRecord::Environment,
                )),
                ResourceKind::Network => {
                    resources.extend(bind(kind, &self.networks, ResourceRecord::Network));
                }
                ResourceKind::Volume => {
                    resources.extend(bind(kind, &self.volumes, ResourceRecord::Volume));
                }
                ResourceKind::Image => {
                    resources.extend(bind(kind, &self.images, ResourceRecord::Image));
                }
                ResourceKind::ImagePull => {
                    resources.extend(bind(kind, &self.image_pulls, ResourceRecord::ImagePull));
                }
                ResourceKind::ComposeStack => resources.extend(bind(
                    kind,
                    &self.compose_stacks,
                    ResourceRecord::ComposeStack,
                )),
                ResourceKind::Container => {
                    resources.extend(bind(kind, &self.containers, ResourceRecord::Container));
                }
            }
        }
        resources
    }

    /// Finds a desired resource by address.
    #[must_use]
    pub fn resource(&self, address: &str) -> Option<DesiredResource> {
        self.desired_resources()
            .into_iter()
            .find(|r| r.address == address)
    }

    /// Returns the total number of declared resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.environments.len()
            + self.networks.len()
            + self.volumes.len()
            + self.images.len()
            + self.image_pulls.len()
            + self.compose_stacks.len()
            + self.containers.len()
    }

    /// Returns the declared addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.desired_resources()
            .into_iter()
            .map(|r| r.address)
            .collect()
    }
}

impl DesiredResource {
    /// Returns the kind of the resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.record.kind()
    }

    /// Returns the desired record.
    #[must_use]
    pub const fn record(&self) -> &ResourceRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let addr = address(ResourceKind::ComposeStack, "app");
        assert_eq!(addr, "compose_stack.app");
        assert_eq!(parse_address(&addr), Some((ResourceKind::ComposeStack, "app")));
        assert_eq!(parse_address("container."), None);
        assert_eq!(parse_address("nothing"), None);
    }

    #[test]
    fn test_desired_resources_follow_apply_order() {
        let mut config = DockhandConfig::default();
        config.containers.insert(
            String::from("web"),
            Container {
                environment_id: String::from("e1"),
                name: String::from("web"),
                image: String::from("nginx"),
                ..Default::default()
            },
        );
        config.networks.insert(
            String::from("front"),
            Network {
                environment_id: String::from("e1"),
                name: String::from("front"),
                ..Default::default()
            },
        );

        let addresses = config.addresses();
        assert_eq!(addresses, vec!["network.front", "container.web"]);
        assert_eq!(config.resource_count(), 2);
    }

    #[test]
    fn test_provider_debug_hides_credentials() {
        let provider = ProviderConfig {
            endpoint: String::from("https://dockhand.local"),
            api_key: Some(String::from("secret-key")),
            ..Default::default()
        };
        assert!(!format!("{provider:?}").contains("secret-key"));
    }
}
