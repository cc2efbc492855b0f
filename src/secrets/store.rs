//! Secret store client port.

use async_trait::async_trait;

use super::error::Result;
use super::types::{SecretPayload, SecretVersion};

/// Trait for versioned secret stores.
///
/// The rotation engine only ever observes version metadata through
/// [`SecretStore::list_versions`] and requests state transitions; the store
/// stays the source of truth for every rotation decision.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log payloads
/// - Network communication MUST use TLS
///
/// # Example Implementation
///
/// ```rust,ignore
/// use secret_rotator::secrets::{Result, SecretPayload, SecretStore, SecretVersion};
/// use async_trait::async_trait;
///
/// struct MyStore;
///
/// #[async_trait]
/// impl SecretStore for MyStore {
///     async fn create_version(&self, secret: &str, payload: SecretPayload) -> Result<SecretVersion> {
///         todo!()
///     }
///
///     async fn list_versions(&self, secret: &str) -> Result<Vec<SecretVersion>> {
///         Ok(vec![])
///     }
///
///     async fn access_version(&self, secret: &str, version: &str) -> Result<SecretPayload> {
///         todo!()
///     }
///
///     async fn disable_version(&self, secret: &str, version: &str) -> Result<()> {
///         Ok(())
///     }
///
///     async fn destroy_version(&self, secret: &str, version: &str) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Add a new enabled version holding `payload`.
    ///
    /// Creates the secret itself if the store requires it and it does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::InvalidName`](super::SecretsError::InvalidName) if the name is malformed
    /// - [`SecretsError::BackendError`](super::SecretsError::BackendError) if storage fails
    async fn create_version(&self, secret: &str, payload: SecretPayload) -> Result<SecretVersion>;

    /// List every version of a secret, in no particular order.
    ///
    /// A secret that does not exist yet has no versions; implementations
    /// return an empty list rather than `NotFound`.
    async fn list_versions(&self, secret: &str) -> Result<Vec<SecretVersion>>;

    /// Read the material held by a version.
    ///
    /// Stores may refuse to serve versions that are not enabled (GCP Secret
    /// Manager does).
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`](super::SecretsError::NotFound) if the version doesn't exist
    /// - [`SecretsError::InvalidTransition`](super::SecretsError::InvalidTransition) if its material is gone
    async fn access_version(&self, secret: &str, version: &str) -> Result<SecretPayload>;

    /// Move an enabled version to disabled.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`](super::SecretsError::NotFound) if the version doesn't exist
    /// - [`SecretsError::InvalidTransition`](super::SecretsError::InvalidTransition) if it is not enabled
    async fn disable_version(&self, secret: &str, version: &str) -> Result<()>;

    /// Irreversibly destroy a disabled version's material.
    ///
    /// # Errors
    ///
    /// - [`SecretsError::NotFound`](super::SecretsError::NotFound) if the version doesn't exist
    /// - [`SecretsError::InvalidTransition`](super::SecretsError::InvalidTransition) if it is not disabled
    async fn destroy_version(&self, secret: &str, version: &str) -> Result<()>;
}
