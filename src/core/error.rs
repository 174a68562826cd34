//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`CacheError`] which covers every failure the cache core can
//! surface to its caller. Server-side failures are deliberately absent: those are
//! represented by [`ExecError`] and are converted into alerts plus an execution
//! status before they reach the caller. The only server condition that crosses the
//! boundary is an interruption, which aborts the running action.
//!
//! # Public API
//! - [`CacheError`]: Main error enum covering all failure modes of the cache core
//! - [`ExecError`]: Error raised by the external server execution capability
//! - [`Result<T>`]: Type alias for `std::result::Result<T, CacheError>`
//!
//! # Error Categories
//! - **Persistence**: I/O, JSON, malformed state records, dangling references
//! - **Validation**: Pending update parameters checked against the action schema
//! - **Connection**: Interruption of a running server action
//! - **Configuration**: Config and cache directory resolution

use std::path::PathBuf;
use thiserror::Error;

/// Domain-specific error types for the client state cache
#[derive(Error, Debug)]
pub enum CacheError {
    // Persistence errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected state element '{expected}', found '{found}'")]
    UnexpectedElement { expected: String, found: String },

    #[error("State element '{tag}' is missing attribute '{attribute}'")]
    MissingAttribute { tag: String, attribute: String },

    #[error("Invalid number '{value}' in state element '{tag}'")]
    InvalidNumber { tag: String, value: String },

    #[error("Unknown file mapping reference '{reference}'")]
    UnknownMappingReference { reference: String },

    #[error("Unknown value '{value}' for {kind}")]
    UnknownEnumValue { kind: String, value: String },

    #[error("Failed to read state file '{path}': {source}")]
    StateReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write state file '{path}': {source}")]
    StateWriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("State file does not exist at '{path}'")]
    StateFileNotFound { path: PathBuf },

    // Pending update validation errors
    #[error("Parameter '{key}' is not valid for update action {action}")]
    InvalidParameter { action: String, key: String },

    #[error("Parameter '{key}' for update action {action} has no value")]
    NullParameter { action: String, key: String },

    #[error("Parameter '{key}' for update action {action} must be {expected}")]
    InvalidParameterType {
        action: String,
        key: String,
        expected: String,
    },

    #[error("Update action {action} requires at least one object id")]
    NoUpdateIds { action: String },

    // Connection errors
    #[error("Server action was interrupted")]
    Interrupted,

    // Configuration errors
    #[error("No client selected; pass --state, or --server with --client")]
    NoClientSelected,

    #[error("Could not find configuration directory")]
    ConfigDirectoryNotFound,

    #[error("Could not find cache directory")]
    CacheDirectoryNotFound,

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Create an unexpected element error
    pub fn unexpected_element(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedElement {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a missing attribute error
    pub fn missing_attribute(tag: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            tag: tag.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an invalid number error
    pub fn invalid_number(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidNumber {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// Create an unknown mapping reference error
    pub fn unknown_mapping_reference(reference: impl Into<String>) -> Self {
        Self::UnknownMappingReference {
            reference: reference.into(),
        }
    }

    /// Create an unknown enum value error
    pub fn unknown_enum_value(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnknownEnumValue {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(action: impl std::fmt::Debug, key: impl Into<String>) -> Self {
        Self::InvalidParameter {
            action: format!("{action:?}"),
            key: key.into(),
        }
    }

    /// Create a null parameter error
    pub fn null_parameter(action: impl std::fmt::Debug, key: impl Into<String>) -> Self {
        Self::NullParameter {
            action: format!("{action:?}"),
            key: key.into(),
        }
    }

    /// Create an invalid parameter type error
    pub fn invalid_parameter_type(
        action: impl std::fmt::Debug,
        key: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidParameterType {
            action: format!("{action:?}"),
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Create a state read failed error
    pub fn state_read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StateReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a state write failed error
    pub fn state_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StateWriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a state parse failed error
    pub fn state_parse_failed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::StateParseFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a state file not found error
    pub fn state_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::StateFileNotFound { path: path.into() }
    }

    /// Create a directory creation failed error
    pub fn directory_creation_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by the server execution capability.
///
/// Only `Interrupted` is allowed to escape the cache core; the others become alerts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("Disconnected from server: {message}")]
    Disconnected { message: String },

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("Server call interrupted")]
    Interrupted,
}

impl ExecError {
    /// Create a disconnected error
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::Disconnected {
            message: message.into(),
        }
    }

    /// Create a generic server error
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// True for the recoverable connectivity loss that triggers a retry
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Interrupted;
        assert_eq!(err.to_string(), "Server action was interrupted");
    }

    #[test]
    fn test_missing_attribute_error() {
        let err = CacheError::missing_attribute("ch", "id");
        assert_eq!(
            err.to_string(),
            "State element 'ch' is missing attribute 'id'"
        );
    }

    #[test]
    fn test_invalid_parameter_error() {
        let err = CacheError::invalid_parameter("EditFile", "pattern");
        assert!(err.to_string().contains("pattern"));
        assert!(err.to_string().contains("EditFile"));
    }

    #[test]
    fn test_state_write_failed() {
        let path = std::path::PathBuf::from("/test/state.json");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CacheError::state_write_failed(&path, io_err);
        assert!(err.to_string().contains("/test/state.json"));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_state_parse_failed() {
        let path = std::path::PathBuf::from("/test/state.json");
        let json_err = serde_json::from_str::<serde_json::Value>("{ invalid json").unwrap_err();
        let err = CacheError::state_parse_failed(&path, json_err);
        assert!(err.to_string().contains("/test/state.json"));
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_exec_error_disconnected() {
        let err = ExecError::disconnected("socket closed");
        assert!(err.is_disconnected());
        assert!(!ExecError::server("bad").is_disconnected());
        assert_eq!(err.to_string(), "Disconnected from server: socket closed");
    }
}
