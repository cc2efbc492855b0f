//! Per-secret rotation errors.
//!
//! A [`RotationError`] never escapes a pass: it is recorded in that secret's
//! outcome and the pass moves on to the next secret.

use thiserror::Error;

use crate::provisioners::ProvisionError;
use crate::secrets::SecretsError;

#[derive(Error, Debug)]
pub enum RotationError {
    /// The declaration for this secret is malformed
    #[error("Invalid spec: {message}")]
    InvalidSpec { message: String },

    /// No provisioner is registered for the declared type
    #[error("No provisioner registered for secret type '{secret_type}'")]
    MissingProvisioner { secret_type: String },

    #[error("Failed to list versions: {source}")]
    ListVersions {
        #[source]
        source: SecretsError,
    },

    #[error("Failed to generate secret material: {source}")]
    Generate {
        #[source]
        source: ProvisionError,
    },

    #[error("Failed to create version: {source}")]
    CreateVersion {
        #[source]
        source: SecretsError,
    },

    #[error("Failed to read version {version}: {source}")]
    AccessVersion {
        version: String,
        #[source]
        source: SecretsError,
    },

    #[error("Failed to retire version {version}: {source}")]
    RetireVersion {
        version: String,
        #[source]
        source: ProvisionError,
    },

    #[error("Failed to disable version {version}: {source}")]
    DisableVersion {
        version: String,
        #[source]
        source: SecretsError,
    },

    #[error("Failed to destroy version {version}: {source}")]
    DestroyVersion {
        version: String,
        #[source]
        source: SecretsError,
    },
}

impl RotationError {
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec { message: message.into() }
    }

    pub fn missing_provisioner(secret_type: impl Into<String>) -> Self {
        Self::MissingProvisioner { secret_type: secret_type.into() }
    }

    /// Whether the failure comes from the declaration rather than a
    /// collaborator.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidSpec { .. } | Self::MissingProvisioner { .. })
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSpec { .. } => "invalid_spec",
            Self::MissingProvisioner { .. } => "missing_provisioner",
            Self::ListVersions { .. } => "list_versions",
            Self::Generate { .. } => "generate",
            Self::CreateVersion { .. } => "create_version",
            Self::AccessVersion { .. } => "access_version",
            Self::RetireVersion { .. } => "retire_version",
            Self::DisableVersion { .. } => "disable_version",
            Self::DestroyVersion { .. } => "destroy_version",
        }
    }
}
