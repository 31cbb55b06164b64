//! Storage seam for the state file.

use async_trait::async_trait;

use super::types::StateFile;
use crate::error::Result;

/// Where a [`StateFile`] lives between runs.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads the stored state; `None` before the first apply.
    async fn load(&self) -> Result<Option<StateFile>>;

    /// Replaces the stored state.
    async fn save(&self, state: &StateFile) -> Result<()>;

    /// Removes the stored state entirely.
    async fn delete(&self) -> Result<()>;

    /// Returns true if a state has been stored.
    async fn exists(&self) -> Result<bool>;

    /// Short name of the backend, for logs.
    fn backend_type(&self) -> &'static str;

    /// Loads the state, or starts an empty one.
    async fn load_or_default(&self) -> Result<StateFile> {
        Ok(self.load().await?.unwrap_or_default())
    }
}
