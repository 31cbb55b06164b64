//! Resource record model.
//!
//! Every Docker object managed through Dockhand is described by a typed
//! record. Records serialize to the snake_case JSON the Dockhand API speaks,
//! so the reconciliation engine can treat them uniformly as JSON objects
//! and consult the per-kind [`KindPolicy`] for field semantics.

mod policy;
mod records;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use policy::{
    CreateStrategy, FieldChange, FieldPolicy, KindPolicy, REDACTED, ReadStrategy, UpdateStrategy,
    get_path, is_non_empty, redacted, remove_path, set_path,
};
pub use records::{
    ComposeService, ComposeStack, Container, ContainerMount, ContainerPort, DockerInfo,
    Environment, EnvironmentAuth, GitAuth, GitRepository, Image, ImagePull, Ipam, IpamConfig,
    Labels, Network, ResourceRecord, Volume, from_object, to_object,
};

/// Kinds of resources managed through the Dockhand API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A Docker host registered in Dockhand.
    Environment,
    /// A Docker network.
    Network,
    /// A Docker volume.
    Volume,
    /// An image adopted by reference.
    Image,
    /// An image pulled from a registry.
    ImagePull,
    /// A Docker Compose stack.
    ComposeStack,
    /// A Docker container.
    Container,
}

impl ResourceKind {
    /// All kinds, in the order they are applied.
    pub const ALL: [Self; 7] = [
        Self::Environment,
        Self::Network,
        Self::Volume,
        Self::Image,
        Self::ImagePull,
        Self::ComposeStack,
        Self::Container,
    ];

    /// Returns the collection segment under `/api/environments/{env}`.
    ///
    /// Environments are the collection itself, so they have no segment.
    #[must_use]
    pub const fn path_segment(self) -> Option<&'static str> {
        match self {
            Self::Environment => None,
            Self::Network => Some("networks"),
            Self::Volume => Some("volumes"),
            Self::Image | Self::ImagePull => Some("images"),
            Self::ComposeStack => Some("compose-stacks"),
            Self::Container => Some("containers"),
        }
    }

    /// Returns true if objects of this kind live inside an environment.
    #[must_use]
    pub const fn is_environment_scoped(self) -> bool {
        !matches!(self, Self::Environment)
    }

    /// Returns the snake_case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Image => "image",
            Self::ImagePull => "image_pull",
            Self::ComposeStack => "compose_stack",
            Self::Container => "container",
        }
    }

    /// Returns the static policy for this kind.
    #[must_use]
    pub fn policy(self) -> &'static KindPolicy {
        KindPolicy::for_kind(self)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let normalized = normalized.strip_suffix('s').unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// Kind-specific lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Start the object.
    Start,
    /// Stop the object.
    Stop,
    /// Restart the object.
    Restart,
    /// Pause the object.
    Pause,
    /// Unpause the object.
    Unpause,
}

impl Action {
    /// Returns the URL segment for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "pause" => Ok(Self::Pause),
            "unpause" => Ok(Self::Unpause),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// A typed record of one resource kind.
///
/// Implementors serialize to the wire object the Dockhand API accepts and
/// returns; the engine relies on that round trip for merging.
pub trait Resource:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// The kind this record describes.
    const KIND: ResourceKind;

    /// Remote identifier, empty until created.
    fn id(&self) -> &str;

    /// Target environment, empty for the Environment kind.
    fn environment_id(&self) -> &str;

    /// Human-facing name of the object.
    fn name(&self) -> &str;

    /// Borrows the record out of the tagged union, if the kind matches.
    fn from_record(record: &ResourceRecord) -> Option<&Self>;

    /// Wraps the record into the tagged union.
    fn into_record(self) -> ResourceRecord;

    /// Returns the static policy for this record's kind.
    #[must_use]
    fn policy() -> &'static KindPolicy {
        KindPolicy::for_kind(Self::KIND)
    }
}
