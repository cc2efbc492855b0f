//! Error types for secret store operations.

use thiserror::Error;

/// Result type for secret store operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while talking to a secret store.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Secret or version not found in the store.
    #[error("Secret not found: {key}")]
    NotFound { key: String },

    /// Failed to connect to the store.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Authentication with the store failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Invalid secret name format.
    #[error("Invalid secret name: {name} - {reason}")]
    InvalidName { name: String, reason: String },

    /// The store refused a version state change.
    #[error("Invalid transition for '{key}' version {version}: {reason}")]
    InvalidTransition { key: String, version: String, reason: String },

    /// Backend-specific error.
    #[error("Backend error: {message}")]
    BackendError { message: String },

    /// Store client configuration error.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SecretsError {
    /// Create a not found error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    /// Create an authentication failed error.
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into(), reason: reason.into() }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(
        key: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition { key: key.into(), version: version.into(), reason: reason.into() }
    }

    /// Create a backend error.
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError { message: message.into() }
    }

    /// Create a config error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}
