//! # Error Types
//!
//! Process-level error types for the secret rotator using `thiserror`.

use crate::secrets::SecretsError;

/// Custom result type for rotator operations
pub type Result<T> = std::result::Result<T, RotatorError>;

/// Main error type for the secret rotator
#[derive(thiserror::Error, Debug)]
pub enum RotatorError {
    /// Configuration errors (bad flags, unreadable or unparsable declarations)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Config source watch errors
    #[error("Watch error: {message}")]
    Watch { message: String },

    /// Secret store errors surfaced at process level (client construction)
    #[error("Secret store error: {0}")]
    Store(#[from] SecretsError),
}

impl RotatorError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a watch error
    pub fn watch<S: Into<String>>(message: S) -> Self {
        Self::Watch { message: message.into() }
    }
}

impl From<std::io::Error> for RotatorError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for RotatorError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config_with_source("Failed to parse rotation config", Box::new(error))
    }
}

impl From<notify::Error> for RotatorError {
    fn from(error: notify::Error) -> Self {
        Self::watch(error.to_string())
    }
}

impl From<validator::ValidationErrors> for RotatorError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
