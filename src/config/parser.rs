//! Configuration parser for loading `dockhand.yaml`.
//!
//! Values come from the YAML file, then `.env`, then process environment
//! variables, the later taking precedence.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::spec::DockhandConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "DOCKHAND_CONFIG";

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["dockhand.yaml", "dockhand.yml"];

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory holding the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory the `.env` file is read from.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DockhandConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// Records declared without a name take their map key.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DockhandConfig> {
        let mut config: DockhandConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })?;

        default_names(&mut config);
        debug!("Parsed {} resource(s)", config.resource_count());
        Ok(config)
    }

    /// Loads `.env`, the file, and environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DockhandConfig> {
        self.load_dotenv()?;
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Applies `DOCKHAND_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `DOCKHAND_TIMEOUT` is not a number.
    pub fn apply_env_overrides(config: &mut DockhandConfig) -> Result<()> {
        if let Ok(endpoint) = std::env::var("DOCKHAND_ENDPOINT") {
            debug!("Overriding provider.endpoint from environment");
            config.provider.endpoint = endpoint;
        }

        if let Ok(api_key) = std::env::var("DOCKHAND_API_KEY") {
            debug!("Overriding provider.api_key from environment");
            config.provider.api_key = Some(api_key);
        }

        if let Ok(cookie) = std::env::var("DOCKHAND_COOKIE") {
            debug!("Overriding provider.cookie from environment");
            config.provider.cookie = Some(cookie);
        }

        if let Ok(timeout) = std::env::var("DOCKHAND_TIMEOUT") {
            debug!("Overriding provider.timeout_secs from environment");
            config.provider.timeout_secs =
                timeout
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::validation(
                        format!("DOCKHAND_TIMEOUT must be a number of seconds, got '{timeout}'"),
                        "provider.timeout_secs",
                    ))?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn default_names(config: &mut DockhandConfig) {
    macro_rules! fill {
        ($($map:ident),+) => {
            $(
                for (key, record) in &mut config.$map {
                    if record.name.is_empty() {
                        record.name.clone_from(key);
                    }
                }
            )+
        };
    }
    fill!(environments, networks, volumes, compose_stacks, containers);
}

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}
