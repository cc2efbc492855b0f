//! # Provisioners
//!
//! A provisioner mints fresh secret material for one secret type. The
//! rotation engine selects one per secret through the [`ProvisionerRegistry`]
//! using the declared `type` of each secret.
//!
//! | Type | Provisioner | Deletion |
//! |------|-------------|----------|
//! | `random` | [`RandomProvisioner`] | supported |
//! | `service_account_key` | `ServiceAccountKeyProvisioner` (feature `gcp`) | per `--enable-deletion` |

pub mod random;
pub mod registry;
#[cfg(feature = "gcp")]
pub mod service_account;

pub use random::{RandomProvisioner, RANDOM_TYPE};
pub use registry::ProvisionerRegistry;
#[cfg(feature = "gcp")]
pub use service_account::{ServiceAccountKeyProvisioner, SERVICE_ACCOUNT_KEY_TYPE};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SecretSpec;
use crate::secrets::{SecretPayload, SecretVersion};

/// Errors raised while generating secret material.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// The secret's params are missing or malformed for this provisioner
    #[error("Invalid provisioner params: {message}")]
    InvalidParams { message: String },

    /// Material could not be produced
    #[error("Generation failed: {message}")]
    Generation { message: String },

    /// An external system the provisioner depends on failed
    #[error("Provisioner backend error: {message}")]
    Backend { message: String },

    /// Material of a version being disabled could not be released
    #[error("Retirement failed: {message}")]
    Retirement { message: String },
}

impl ProvisionError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams { message: message.into() }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation { message: message.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    pub fn retirement(message: impl Into<String>) -> Self {
        Self::Retirement { message: message.into() }
    }
}

/// Generates new material for one secret type.
///
/// Implementations must work with an empty version history and must not
/// rely on the order of `existing`.
#[async_trait]
pub trait SecretProvisioner: Send + Sync {
    /// Secret type this provisioner handles, matched against `SecretSpec::secret_type`
    fn secret_type(&self) -> &str;

    /// Produce material for a new version of `spec`.
    async fn generate(
        &self,
        spec: &SecretSpec,
        existing: &[SecretVersion],
    ) -> Result<SecretPayload, ProvisionError>;

    /// Whether disabled versions of this type may be destroyed.
    fn supports_deletion(&self) -> bool {
        false
    }

    /// Whether versions are backed by resources outside the store that
    /// [`SecretProvisioner::retire`] must release.
    fn retires_material(&self) -> bool {
        false
    }

    /// Release whatever backs `payload`, the material of a version that is
    /// about to be disabled. Called only when
    /// [`SecretProvisioner::retires_material`] is true, and possibly more
    /// than once for the same material.
    async fn retire(&self, _spec: &SecretSpec, _payload: &SecretPayload) -> Result<(), ProvisionError> {
        Ok(())
    }
}
