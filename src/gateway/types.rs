//! Dockhand API wire types that are not resource records.

use serde::{Deserialize, Serialize};

use crate::resource::{ImagePull, ResourceKind};

/// Body of `POST /api/environments/{env}/images/pull`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePullRequest {
    /// Image reference.
    pub image: String,
    /// Registry host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Registry credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<ImageAuth>,
}

/// Registry credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAuth {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for ImageAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl From<&ImagePull> for ImagePullRequest {
    fn from(pull: &ImagePull) -> Self {
        let auth = match (&pull.auth_username, &pull.auth_password) {
            (Some(username), Some(password)) => Some(ImageAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Self {
            image: pull.image.clone(),
            registry: pull.registry.clone().filter(|r| !r.is_empty()),
            auth,
        }
    }
}

/// Summary row of an inventory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryItem {
    /// Kind of the object.
    pub kind: ResourceKind,
    /// Remote identifier.
    pub id: String,
    /// Object name.
    pub name: String,
    /// Kind-specific detail (image and state, driver, tags...).
    pub detail: String,
}
