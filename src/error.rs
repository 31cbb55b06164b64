//! Error types for the Dockhand reconciliation system.
//!
//! This module provides the error hierarchy for every layer of the
//! reconciliation lifecycle: configuration, state, the remote Gateway,
//! and the reconciliation engine itself.

use std::path::PathBuf;
use thiserror::Error;

use crate::resource::ResourceKind;

/// The main error type for the Dockhand reconciliation system.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Gateway (Dockhand API) errors outside of a reconciliation.
    #[error("Dockhand API error: {0}")]
    Gateway(#[from] GatewayError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Two resources address the same remote object.
    #[error("Duplicate {kind} '{name}' in environment '{environment_id}'")]
    DuplicateResource {
        /// Resource kind.
        kind: ResourceKind,
        /// Environment the duplicates target.
        environment_id: String,
        /// The duplicated name.
        name: String,
    },

    /// A resource address was referenced but not declared.
    #[error("Unknown resource address: {address}")]
    UnknownAddress {
        /// The address that was not found.
        address: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The state file could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },

    /// Two records address the same remote object.
    #[error("Duplicate {kind} record {environment_id}/{id} in state")]
    DuplicateRecord {
        /// Resource kind.
        kind: ResourceKind,
        /// Environment of the record.
        environment_id: String,
        /// Remote identifier of the record.
        id: String,
    },
}

/// Errors returned by a Gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request never produced an HTTP response (connection, timeout, TLS).
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The Gateway answered 404.
    #[error("404 {body}")]
    NotFound {
        /// Response body, verbatim.
        body: String,
    },

    /// The Gateway answered with another non-2xx status.
    #[error("{status} {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The Gateway answered 2xx with a body that could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the decode failure.
        message: String,
    },
}

/// Reconciliation errors.
///
/// Every variant names the failing operation and resource kind so operators
/// can correlate with server-side logs.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Transport-level failure calling the Gateway.
    #[error("{operation} {kind} failed: Dockhand API unavailable: {message}")]
    RemoteUnavailable {
        /// Operation that failed.
        operation: Operation,
        /// Resource kind.
        kind: ResourceKind,
        /// Transport failure description.
        message: String,
    },

    /// The Gateway responded with a non-2xx status.
    #[error("{operation} {kind} failed: {status} {body}")]
    RemoteRejected {
        /// Operation that failed.
        operation: Operation,
        /// Resource kind.
        kind: ResourceKind,
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// A replace deleted the old object but could not create the new one.
    ///
    /// The old record is void and the remote existence of the new object is
    /// unknown; a follow-up read is required before any further action.
    #[error("replace {kind} failed after deleting '{deleted_id}': {source}")]
    PartialReplaceFailure {
        /// Resource kind.
        kind: ResourceKind,
        /// Identifier of the object that was deleted.
        deleted_id: String,
        /// The create failure.
        #[source]
        source: Box<ReconcileError>,
    },

    /// The record violates the data model.
    #[error("invalid {kind} record: {message}")]
    InvalidRecord {
        /// Resource kind.
        kind: ResourceKind,
        /// What is wrong with the record.
        message: String,
    },

    /// The kind does not support the requested action.
    #[error("{kind} does not support the '{action}' action")]
    UnsupportedAction {
        /// Resource kind.
        kind: ResourceKind,
        /// Requested action.
        action: String,
    },
}

/// Gateway operation named in reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create call (including image adopt and pull).
    Create,
    /// Read call.
    Read,
    /// Update call.
    Update,
    /// Delete call.
    Delete,
    /// Kind-specific action call.
    Action,
}

/// Result type alias for Dockhand operations.
pub type Result<T> = std::result::Result<T, DockhandError>;

impl DockhandError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is a transient transport failure.
    ///
    /// The engine never retries; this is for the host to decide.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Gateway(GatewayError::Transport { .. })
                | Self::Reconcile(ReconcileError::RemoteUnavailable { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl GatewayError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Classifies a non-2xx response.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 404 {
            Self::NotFound { body }
        } else {
            Self::Status { status, body }
        }
    }

    /// Returns true for a 404 answer.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ReconcileError {
    /// Classifies a Gateway failure for the given operation and kind.
    #[must_use]
    pub fn from_gateway(operation: Operation, kind: ResourceKind, err: GatewayError) -> Self {
        match err {
            GatewayError::Transport { message } => Self::RemoteUnavailable {
                operation,
                kind,
                message,
            },
            GatewayError::NotFound { body } => Self::RemoteRejected {
                operation,
                kind,
                status: 404,
                body,
            },
            GatewayError::Status { status, body } => Self::RemoteRejected {
                operation,
                kind,
                status,
                body,
            },
            GatewayError::InvalidResponse { message } => Self::InvalidRecord { kind, message },
        }
    }

    /// Creates an invalid record error.
    #[must_use]
    pub fn invalid(kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            kind,
            message: message.into(),
        }
    }

    /// Returns true when the remote state is ambiguous and must be re-read.
    #[must_use]
    pub const fn requires_resync(&self) -> bool {
        matches!(self, Self::PartialReplaceFailure { .. })
    }

    /// Returns the HTTP status the Gateway answered with, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } => Some(*status),
            Self::PartialReplaceFailure { source, .. } => source.status(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Action => "action",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(GatewayError::from_status(404, "gone").is_not_found());
        assert!(!GatewayError::from_status(409, "conflict").is_not_found());
    }

    #[test]
    fn test_rejected_message_carries_status_and_body() {
        let err = ReconcileError::from_gateway(
            Operation::Update,
            ResourceKind::Container,
            GatewayError::from_status(409, "update already in progress"),
        );

        assert_eq!(err.status(), Some(409));
        assert_eq!(
            err.to_string(),
            "update container failed: 409 update already in progress"
        );
    }

    #[test]
    fn test_partial_replace_requires_resync() {
        let create_failure = ReconcileError::from_gateway(
            Operation::Create,
            ResourceKind::ImagePull,
            GatewayError::from_status(500, "registry unreachable"),
        );
        let err = ReconcileError::PartialReplaceFailure {
            kind: ResourceKind::ImagePull,
            deleted_id: String::from("nginx:1.25"),
            source: Box::new(create_failure),
        };

        assert!(err.requires_resync());
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = DockhandError::from(GatewayError::transport("connection refused"));
        assert!(err.is_retryable());

        let err = DockhandError::from(GatewayError::from_status(500, "boom"));
        assert!(!err.is_retryable());
    }
}
