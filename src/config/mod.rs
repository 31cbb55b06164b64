//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `dockhand.yaml`
//! - Validation of provider settings and declared resources
//! - Computing configuration hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{CONFIG_ENV_VAR, ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    DEFAULT_STATE_PATH, DEFAULT_TIMEOUT_SECS, DesiredResource, DockhandConfig, ProviderConfig,
    StateConfig, address, parse_address,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
