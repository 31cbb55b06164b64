//! Typed records for each resource kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ReconcileError;

use super::{Resource, ResourceKind};

/// Label map shared by most kinds.
pub type Labels = BTreeMap<String, String>;

// ============================================================================
// Container
// ============================================================================

/// A Docker container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Container name.
    #[serde(default)]
    pub name: String,
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Published ports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ContainerPort>>,
    /// Volume and bind mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Vec<ContainerMount>>,
    /// Environment variables as `KEY=value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    /// Container labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// Entrypoint command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Memory limit in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    /// CPU quota.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Restart policy (`no`, `always`, `on-failure`, `unless-stopped`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<String>,
    /// Runtime state reported by Docker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Human-readable status reported by Docker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A published container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPort {
    /// Port inside the container.
    pub private_port: u16,
    /// Port on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,
    /// Protocol (`tcp` or `udp`).
    #[serde(rename = "type", default = "default_protocol")]
    pub protocol: String,
    /// Host IP to bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// A container mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMount {
    /// Volume name or host path.
    pub source: String,
    /// Path inside the container.
    pub destination: String,
    /// Mount mode (`rw` or `ro`).
    #[serde(default = "default_mount_mode")]
    pub mode: String,
    /// Mount type (`bind` or `volume`).
    #[serde(rename = "type", default = "default_mount_type")]
    pub mount_type: String,
}

fn default_protocol() -> String {
    String::from("tcp")
}

fn default_mount_mode() -> String {
    String::from("rw")
}

fn default_mount_type() -> String {
    String::from("volume")
}

// ============================================================================
// Compose stack
// ============================================================================

/// A Docker Compose stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeStack {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Stack name.
    #[serde(default)]
    pub name: String,
    /// Compose file content.
    #[serde(default)]
    pub compose: String,
    /// Requested run status (`running` or `stopped`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<String>,
    /// Stack labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// Re-deploy on repository changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<bool>,
    /// Git source for the compose file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<GitRepository>,
    /// Current stack status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Services by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<BTreeMap<String, ComposeService>>,
    /// Webhook token issued by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A service inside a compose stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Service name.
    #[serde(default)]
    pub name: String,
    /// Service image.
    #[serde(default)]
    pub image: String,
    /// Service status.
    #[serde(default)]
    pub status: String,
    /// Replica count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Git repository backing a compose stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepository {
    /// Repository URL.
    pub url: String,
    /// Branch to track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Path of the compose file in the repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Repository credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<GitAuth>,
}

/// Git credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuth {
    /// `ssh` or `https`.
    #[serde(rename = "type", default)]
    pub auth_type: String,
    /// HTTPS token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// SSH private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

// ============================================================================
// Environment
// ============================================================================

/// A Docker host registered in Dockhand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Environment name.
    #[serde(default)]
    pub name: String,
    /// Connection type (`local`, `ssh`, `docker_socket`).
    #[serde(rename = "type", default)]
    pub env_type: String,
    /// Remote host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Remote port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Environment labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// Connection credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<EnvironmentAuth>,
    /// Whether Dockhand can reach the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Docker daemon information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_info: Option<DockerInfo>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Last update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Environment credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentAuth {
    /// `ssh`, `tls` or `basic`.
    #[serde(rename = "type", default)]
    pub auth_type: String,
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// TLS certificate directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<String>,
}

/// Docker daemon information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerInfo {
    /// Docker version.
    pub version: String,
    /// Docker API version.
    pub api_version: String,
    /// Host operating system.
    pub os: String,
    /// Host architecture.
    pub architecture: String,
    /// Total containers.
    pub containers: u64,
    /// Running containers.
    pub containers_running: u64,
    /// Paused containers.
    pub containers_paused: u64,
    /// Stopped containers.
    pub containers_stopped: u64,
    /// Total images.
    pub images: u64,
}

// ============================================================================
// Network
// ============================================================================

/// A Docker network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Network name.
    #[serde(default)]
    pub name: String,
    /// Network type (`bridge`, `overlay`, `host`, `null`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    /// Network driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Network scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Network labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// IP address management.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    /// Attached containers, keyed by container id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<BTreeMap<String, Value>>,
}

/// IP address management settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    /// IPAM driver.
    #[serde(default)]
    pub driver: String,
    /// Address pools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Vec<IpamConfig>>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Labels>,
}

/// A single IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    /// Subnet in CIDR form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Gateway address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

// ============================================================================
// Volume
// ============================================================================

/// A Docker volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Volume name.
    #[serde(default)]
    pub name: String,
    /// Volume driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Volume labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// Driver options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Labels>,
    /// Mount point on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Containers using the volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<String>>,
}

// ============================================================================
// Image
// ============================================================================

/// An existing image adopted by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Remote identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Image reference used to look the image up.
    #[serde(default)]
    pub reference: String,
    /// Repository tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_tags: Option<Vec<String>>,
    /// Repository digests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_digests: Option<Vec<String>>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    /// Image labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    /// Target architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Target operating system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

// ============================================================================
// Image pull
// ============================================================================

/// An image pulled from a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePull {
    /// Remote identifier (the pulled reference).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Target environment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_id: String,
    /// Image reference to pull.
    #[serde(default)]
    pub image: String,
    /// Registry host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Registry username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,
    /// Registry password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_password: Option<String>,
    /// Pull outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// When the pull completed (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulled_at: Option<String>,
}

// ============================================================================
// Resource impls
// ============================================================================

macro_rules! impl_resource {
    ($ty:ident, $name:ident) => {
        impl_resource!($ty, $name, |record| &record.environment_id);
    };
    ($ty:ident, $name:ident, |$this:ident| $env:expr) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$ty;

            fn id(&self) -> &str {
                &self.id
            }

            fn environment_id(&self) -> &str {
                let $this = self;
                $env
            }

            fn name(&self) -> &str {
                &self.$name
            }

            fn from_record(record: &ResourceRecord) -> Option<&Self> {
                match record {
                    ResourceRecord::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_record(self) -> ResourceRecord {
                ResourceRecord::$ty(self)
            }
        }
    };
}

impl_resource!(Container, name);
impl_resource!(ComposeStack, name);
impl_resource!(Network, name);
impl_resource!(Volume, name);
impl_resource!(Image, reference);
impl_resource!(ImagePull, image);
impl_resource!(Environment, name, |_record| "");

// ============================================================================
// Tagged union
// ============================================================================

/// A record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRecord {
    /// A container record.
    Container(Container),
    /// A compose stack record.
    ComposeStack(ComposeStack),
    /// An environment record.
    Environment(Environment),
    /// A network record.
    Network(Network),
    /// A volume record.
    Volume(Volume),
    /// An image record.
    Image(Image),
    /// An image pull record.
    ImagePull(ImagePull),
}

macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            ResourceRecord::Container($inner) => $body,
            ResourceRecord::ComposeStack($inner) => $body,
            ResourceRecord::Environment($inner) => $body,
            ResourceRecord::Network($inner) => $body,
            ResourceRecord::Volume($inner) => $body,
            ResourceRecord::Image($inner) => $body,
            ResourceRecord::ImagePull($inner) => $body,
        }
    };
}

impl ResourceRecord {
    /// Returns the kind of the record.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Container(_) => ResourceKind::Container,
            Self::ComposeStack(_) => ResourceKind::ComposeStack,
            Self::Environment(_) => ResourceKind::Environment,
            Self::Network(_) => ResourceKind::Network,
            Self::Volume(_) => ResourceKind::Volume,
            Self::Image(_) => ResourceKind::Image,
            Self::ImagePull(_) => ResourceKind::ImagePull,
        }
    }

    /// Returns the remote identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        each_record!(self, r => r.id())
    }

    /// Returns the target environment.
    #[must_use]
    pub fn environment_id(&self) -> &str {
        each_record!(self, r => r.environment_id())
    }

    /// Returns the object name.
    #[must_use]
    pub fn name(&self) -> &str {
        each_record!(self, r => r.name())
    }

    /// Returns the record as a wire object, without the `kind` tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn to_value(&self) -> Result<Value, ReconcileError> {
        let kind = self.kind();
        each_record!(self, r => to_object(kind, r))
    }

    /// Builds a record of the given kind from a wire object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not match the kind's shape.
    pub fn from_value(kind: ResourceKind, value: Value) -> Result<Self, ReconcileError> {
        Ok(match kind {
            ResourceKind::Container => Self::Container(from_object(kind, value)?),
            ResourceKind::ComposeStack => Self::ComposeStack(from_object(kind, value)?),
            ResourceKind::Environment => Self::Environment(from_object(kind, value)?),
            ResourceKind::Network => Self::Network(from_object(kind, value)?),
            ResourceKind::Volume => Self::Volume(from_object(kind, value)?),
            ResourceKind::Image => Self::Image(from_object(kind, value)?),
            ResourceKind::ImagePull => Self::ImagePull(from_object(kind, value)?),
        })
    }

    /// Returns a copy with the remote identifier cleared.
    #[must_use]
    pub fn without_id(&self) -> Self {
        let mut record = self.clone();
        each_record!(&mut record, r => r.id.clear());
        record
    }
}

/// Serializes a typed record into a JSON object.
///
/// # Errors
///
/// Returns an error if the record does not serialize to an object.
pub fn to_object<T: Serialize>(kind: ResourceKind, record: &T) -> Result<Value, ReconcileError> {
    let value = serde_json::to_value(record)
        .map_err(|e| ReconcileError::invalid(kind, format!("failed to serialize record: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ReconcileError::invalid(kind, "record is not a JSON object"))
    }
}

/// Deserializes a JSON object into a typed record.
///
/// # Errors
///
/// Returns an error if the object does not match the record shape.
pub fn from_object<T: DeserializeOwned>(
    kind: ResourceKind,
    value: Value,
) -> Result<T, ReconcileError> {
    serde_json::from_value(value)
        .map_err(|e| ReconcileError::invalid(kind, format!("malformed object: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_omitted_and_empty_are_distinct() {
        let omitted = Container {
            name: String::from("web"),
            image: String::from("nginx"),
            ..Default::default()
        };
        let empty = Container {
            labels: Some(Labels::new()),
            ..omitted.clone()
        };

        let omitted = serde_json::to_value(&omitted).expect("serialize");
        let empty = serde_json::to_value(&empty).expect("serialize");

        assert!(omitted.get("labels").is_none());
        assert_eq!(empty["labels"], json!({}));
    }

    #[test]
    fn test_wire_names_are_snake_case() {
        let stack = ComposeStack {
            name: String::from("app"),
            compose: String::from("services: {}"),
            git_repo: Some(GitRepository {
                url: String::from("https://git.example/app.git"),
                auth: Some(GitAuth {
                    auth_type: String::from("https"),
                    token: Some(String::from("t0k3n")),
                    key: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let value = serde_json::to_value(&stack).expect("serialize");
        assert_eq!(value["git_repo"]["auth"]["type"], json!("https"));
        assert_eq!(value["git_repo"]["auth"]["token"], json!("t0k3n"));
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_tagged_union_roundtrip() {
        let record = ResourceRecord::Volume(Volume {
            id: String::from("v1"),
            environment_id: String::from("e1"),
            name: String::from("data"),
            ..Default::default()
        });

        let text = serde_json::to_string(&record).expect("serialize");
        assert!(text.contains("\"kind\":\"volume\""));

        let parsed: ResourceRecord = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, record);
        assert_eq!(parsed.environment_id(), "e1");
        assert_eq!(parsed.without_id().id(), "");
    }

    #[test]
    fn test_from_value_rejects_wrong_shape() {
        let err = ResourceRecord::from_value(ResourceKind::Container, json!({ "name": 5 }))
            .expect_err("should fail");
        assert!(matches!(err, ReconcileError::InvalidRecord { .. }));
    }
}
