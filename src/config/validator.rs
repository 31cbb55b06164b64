//! Configuration validation.
//!
//! Checks every declared resource before any remote call is made, collecting
//! all errors and warnings instead of stopping at the first one.

use std::collections::HashSet;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::resource::{
    ComposeStack, Container, Environment, FieldPolicy, ResourceRecord, is_non_empty,
};

use super::spec::{DockhandConfig, ProviderConfig, parse_address};

/// Timeouts above this are accepted with a warning.
const SLOW_TIMEOUT_SECS: u64 = 300;

/// Hard upper bound for the request timeout.
const MAX_TIMEOUT_SECS: u64 = 3600;

const RESTART_POLICIES: &[&str] = &["no", "always", "on-failure", "unless-stopped"];
const PORT_PROTOCOLS: &[&str] = &["tcp", "udp"];
const MOUNT_MODES: &[&str] = &["rw", "ro"];
const MOUNT_TYPES: &[&str] = &["bind", "volume"];
const STACK_STATUSES: &[&str] = &["running", "stopped"];
const ENVIRONMENT_TYPES: &[&str] = &["local", "ssh", "docker_socket", "tcp"];

/// Validator for `dockhand.yaml`.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing everything found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors.
    pub errors: Vec<ValidationError>,
    /// Non-fatal issues.
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails; [`Self::check`] returns
    /// all of them.
    pub fn validate(&self, config: &DockhandConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!(
                "Configuration validation passed with {} warning(s)",
                result.warnings.len()
            );
            return Ok(result);
        }

        let first = &result.errors[0];
        Err(ConfigError::validation(first.message.clone(), first.field.clone()).into())
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &DockhandConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_provider(&config.provider, &mut result);
        Self::validate_resources(config, &mut result);

        result
    }

    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        if provider.endpoint.trim().is_empty() {
            result.error(
                "provider.endpoint",
                "Endpoint is required (or set DOCKHAND_ENDPOINT)",
            );
        } else {
            match reqwest::Url::parse(&provider.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {
                    if url.scheme() == "http" && provider.api_key.is_some() {
                        result.warn("provider.api_key is sent over plain http");
                    }
                }
                Ok(url) => result.error(
                    "provider.endpoint",
                    format!("Unsupported scheme '{}', expected http or https", url.scheme()),
                ),
                Err(e) => result.error(
                    "provider.endpoint",
                    format!("Invalid endpoint URL '{}': {e}", provider.endpoint),
                ),
            }
        }

        if provider.timeout_secs == 0 {
            result.error("provider.timeout_secs", "Timeout must be at least 1 second");
        } else if provider.timeout_secs > MAX_TIMEOUT_SECS {
            result.error(
                "provider.timeout_secs",
                format!("Timeout cannot exceed {MAX_TIMEOUT_SECS} seconds"),
            );
        } else if provider.timeout_secs > SLOW_TIMEOUT_SECS {
            result.warn(format!(
                "provider.timeout_secs is {}s; failed requests will be slow to surface",
                provider.timeout_secs
            ));
        }

        if provider.api_key.is_none() && provider.cookie.is_none() {
            result.warn("No api_key or cookie configured; requests are unauthenticated");
        }

        if provider.tls_skip_verify {
            result.warn("TLS certificate verification is disabled");
        }
    }

    fn validate_resources(config: &DockhandConfig, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for desired in config.desired_resources() {
            let address = desired.address.as_str();
            let record = desired.record();

            match parse_address(address) {
                Some((_, key)) if is_valid_key(key) => {}
                _ => result.error(
                    address,
                    "Resource key must be alphanumeric with '-' or '_', starting with a letter or digit",
                ),
            }

            Self::validate_required(address, record, result);

            if !record.id().is_empty() {
                result.warn(format!(
                    "{address}: id is assigned by the server and will be ignored"
                ));
            }

            let identity = (
                record.kind(),
                record.environment_id().to_string(),
                record.name().to_string(),
            );
            if !identity.2.is_empty() && !seen.insert(identity.clone()) {
                let (kind, environment_id, name) = identity;
                let err = ConfigError::DuplicateResource {
                    kind,
                    environment_id,
                    name,
                };
                result.error(address, err.to_string());
            }

            match record {
                ResourceRecord::Container(container) => {
                    Self::validate_container(address, container, result);
                }
                ResourceRecord::ComposeStack(stack) => {
                    Self::validate_stack(address, stack, result);
                }
                ResourceRecord::Environment(environment) => {
                    Self::validate_environment(address, environment, result);
                }
                ResourceRecord::Network(_)
                | ResourceRecord::Volume(_)
                | ResourceRecord::Image(_)
                | ResourceRecord::ImagePull(_) => {}
            }
        }
    }

    /// Checks the required fields of the kind's field table.
    fn validate_required(address: &str, record: &ResourceRecord, result: &mut ValidationResult) {
        let value = match record.to_value() {
            Ok(value) => value,
            Err(e) => {
                result.error(address, e.to_string());
                return;
            }
        };

        for (name, field) in record.kind().policy().top_level() {
            if field.contains(FieldPolicy::REQUIRED) && !value.get(name).is_some_and(is_non_empty) {
                result.error(format!("{address}.{name}"), format!("{name} is required"));
            }
        }
    }

    fn validate_container(address: &str, container: &Container, result: &mut ValidationResult) {
        if let Some(policy) = &container.restart_policy {
            one_of(address, "restart_policy", policy, RESTART_POLICIES, result);
        }

        if container.memory.is_some_and(|m| m < 0) {
            result.error(format!("{address}.memory"), "Memory limit cannot be negative");
        }
        if container.cpus.is_some_and(|c| c < 0.0 || !c.is_finite()) {
            result.error(format!("{address}.cpus"), "CPU limit must be a positive number");
        }

        let mut published = HashSet::new();
        for port in container.ports.iter().flatten() {
            one_of(address, "ports.type", &port.protocol, PORT_PROTOCOLS, result);
            if port.private_port == 0 {
                result.error(format!("{address}.ports"), "Port 0 is not a valid container port");
            }
            if let Some(public) = port.public_port
                && !published.insert((public, port.protocol.clone()))
            {
                result.error(
                    format!("{address}.ports"),
                    format!("Host port {public}/{} is published twice", port.protocol),
                );
            }
        }

        for mount in container.mounts.iter().flatten() {
            one_of(address, "mounts.mode", &mount.mode, MOUNT_MODES, result);
            one_of(address, "mounts.type", &mount.mount_type, MOUNT_TYPES, result);
            if !mount.destination.starts_with('/') {
                result.error(
                    format!("{address}.mounts"),
                    format!("Mount destination '{}' must be absolute", mount.destination),
                );
            }
        }

        for entry in container.env.iter().flatten() {
            if !entry.contains('=') {
                result.warn(format!(
                    "{address}: env entry '{entry}' has no '=' and passes the host value through"
                ));
            }
        }
    }

    fn validate_stack(address: &str, stack: &ComposeStack, result: &mut ValidationResult) {
        if let Some(status) = &stack.desired_status {
            one_of(address, "desired_status", status, STACK_STATUSES, result);
        }

        if let Some(repo) = &stack.git_repo {
            if repo.url.is_empty() {
                result.error(format!("{address}.git_repo.url"), "Repository URL is required");
            }
            if let Some(auth) = &repo.auth {
                match auth.auth_type.as_str() {
                    "https" if auth.token.is_none() => result.warn(format!(
                        "{address}: https git auth without a token"
                    )),
                    "ssh" if auth.key.is_none() => result.warn(format!(
                        "{address}: ssh git auth without a key"
                    )),
                    "https" | "ssh" => {}
                    other => result.error(
                        format!("{address}.git_repo.auth.type"),
                        format!("Unknown git auth type '{other}', expected ssh or https"),
                    ),
                }
            }
        } else if stack.auto_sync == Some(true) {
            result.warn(format!("{address}: auto_sync has no effect without git_repo"));
        }
    }

    fn validate_environment(
        address: &str,
        environment: &Environment,
        result: &mut ValidationResult,
    ) {
        let env_type = environment.env_type.as_str();
        if !env_type.is_empty() && !ENVIRONMENT_TYPES.contains(&env_type) {
            result.warn(format!(
                "{address}: unknown environment type '{env_type}', expected one of {}",
                ENVIRONMENT_TYPES.join(", ")
            ));
        }
        if env_type != "local" && !env_type.is_empty() && environment.host.is_none() {
            result.error(
                format!("{address}.host"),
                format!("A host is required for '{env_type}' environments"),
            );
        }
    }
}

fn one_of(
    address: &str,
    field: &str,
    value: &str,
    allowed: &[&str],
    result: &mut ValidationResult,
) {
    if !allowed.contains(&value) {
        result.error(
            format!("{address}.{field}"),
            format!("'{value}' is invalid, expected one of {}", allowed.join(", ")),
        );
    }
}

/// Checks a map key: alphanumeric with `-` or `_`.
fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ContainerPort, Volume};

    fn config() -> DockhandConfig {
        let mut config = DockhandConfig::default();
        config.provider.endpoint = String::from("https://dockhand.example.com");
        config.provider.api_key = Some(String::from("key"));
        config
    }

    fn container(name: &str) -> Container {
        Container {
            environment_id: String::from("1"),
            name: name.to_string(),
            image: String::from("nginx:1.25"),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_key() {
        assert!(is_valid_key("web"));
        assert!(is_valid_key("web_1"));
        assert!(is_valid_key("1-web"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("-web"));
        assert!(!is_valid_key("web.front"));
    }

    #[test]
    fn test_valid_config_passes() {
        let mut config = config();
        config.containers.insert(String::from("web"), container("web"));

        let result = ConfigValidator::new().validate(&config).expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_endpoint_and_timeout_checked() {
        let mut config = config();
        config.provider.endpoint = String::from("ftp://dockhand");
        config.provider.timeout_secs = 0;

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_missing_required_fields_collected() {
        let mut config = config();
        config.containers.insert(String::from("web"), Container::default());
        config.volumes.insert(String::from("data"), Volume::default());

        let result = ConfigValidator::new().check(&config);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"container.web.environment_id"));
        assert!(fields.contains(&"container.web.name"));
        assert!(fields.contains(&"container.web.image"));
        assert!(fields.contains(&"volume.data.environment_id"));
    }

    #[test]
    fn test_duplicate_names_in_environment_rejected() {
        let mut config = config();
        config.containers.insert(String::from("a"), container("web"));
        config.containers.insert(String::from("b"), container("web"));

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 1);
        assert!(result.errors[0].message.contains("Duplicate container 'web'"));
    }

    #[test]
    fn test_container_values_checked() {
        let mut config = config();
        config.containers.insert(
            String::from("web"),
            Container {
                restart_policy: Some(String::from("sometimes")),
                ports: Some(vec![
                    ContainerPort {
                        private_port: 80,
                        public_port: Some(8080),
                        protocol: String::from("tcp"),
                        ip: None,
                    },
                    ContainerPort {
                        private_port: 81,
                        public_port: Some(8080),
                        protocol: String::from("tcp"),
                        ip: None,
                    },
                ]),
                ..container("web")
            },
        );

        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let mut config = config();
        config.provider.api_key = None;
        config.provider.tls_skip_verify = true;

        let result = ConfigValidator::new().validate(&config).expect("valid");
        assert_eq!(result.warning_count(), 2);
    }
}
