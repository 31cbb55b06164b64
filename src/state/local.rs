//! Local file-based state storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::DEFAULT_STATE_PATH;
use crate::error::{Result, StateError};

use super::store::StateStore;
use super::types::StateFile;

/// Local JSON state file.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    /// Path to the state file.
    state_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store at the default path, relative to `base_dir`.
    #[must_use]
    pub fn in_dir(base_dir: impl AsRef<Path>) -> Self {
        Self::with_state_path(base_dir.as_ref().join(DEFAULT_STATE_PATH))
    }

    /// Creates a store for an explicit state file path.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        let Some(dir) = self.state_path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if !dir.exists() {
            debug!("Creating state directory: {}", dir.display());
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StateError::write(format!("failed to create state directory: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<StateFile>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| StateError::Corrupted {
                message: format!("failed to read state file: {e}"),
            })?;

        let state: StateFile =
            serde_json::from_str(&content).map_err(|e| StateError::Corrupted {
                message: format!("failed to parse state file: {e}"),
            })?;
        state.validate()?;

        Ok(Some(state))
    }

    async fn save(&self, state: &StateFile) -> Result<()> {
        self.ensure_dir().await?;

        debug!(
            "Saving state serial {} to: {}",
            state.serial,
            self.state_path.display()
        );

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("failed to create temp state file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("failed to write state file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("failed to rename state file: {e}")))?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| StateError::write(format!("failed to delete state file: {e}")))?;
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
