//! GCP Secret Manager store implementation
//!
//! Creates, lists, disables and destroys secret versions in Google Cloud
//! Secret Manager.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `ROTATOR_GCP_PROJECT_ID` or `GCP_PROJECT_ID` - default project for short secret names
//! - `GOOGLE_APPLICATION_CREDENTIALS` - Optional path to service account key (uses ADC if not set)
//!
//! ## Secret Names
//!
//! Secrets can be named by:
//! - Short form: `my-secret` (qualified with the default project)
//! - Full path: `projects/my-project/secrets/my-secret`
//!
//! Secret Manager does not report when a version was disabled, so versions
//! returned by this store never carry `disabled_at`.

use serde::{Deserialize, Serialize};

use crate::secrets::error::{Result, SecretsError};
use crate::secrets::types::VersionState;

#[cfg(feature = "gcp")]
use crate::secrets::store::SecretStore;
#[cfg(feature = "gcp")]
use crate::secrets::types::{SecretPayload, SecretVersion};
#[cfg(feature = "gcp")]
use async_trait::async_trait;
#[cfg(feature = "gcp")]
use tracing::{debug, error, info};

#[cfg(feature = "gcp")]
use google_secretmanager1::{hyper_rustls, hyper_util, SecretManager};

/// Scope requested for every GCP API call made by the rotator
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Page size used when listing secret versions
#[cfg(feature = "gcp")]
const LIST_PAGE_SIZE: i32 = 100;

/// HTTPS connector used by the Secret Manager hub and the OAuth2 authenticator
#[cfg(feature = "gcp")]
pub type GcpConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;

/// OAuth2 authenticator for GCP APIs
#[cfg(feature = "gcp")]
pub type GcpAuthenticator = yup_oauth2::authenticator::Authenticator<GcpConnector>;

/// Configuration for the GCP Secret Manager store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpStoreConfig {
    /// Project used to qualify short secret names
    pub project_id: Option<String>,
}

impl GcpStoreConfig {
    /// Load configuration from environment variables
    ///
    /// Uses `ROTATOR_GCP_PROJECT_ID` or `GCP_PROJECT_ID`. Without either,
    /// every declared secret must use a fully qualified name.
    pub fn from_env() -> Self {
        Self::from_env_vars("ROTATOR_GCP_PROJECT_ID", "GCP_PROJECT_ID")
    }

    fn from_env_vars(primary: &str, fallback: &str) -> Self {
        let project_id = std::env::var(primary)
            .or_else(|_| std::env::var(fallback))
            .ok()
            .filter(|p| !p.is_empty());

        Self { project_id }
    }

    /// Build the secret resource name for a declared secret name
    ///
    /// - `my-secret` -> `projects/{project}/secrets/my-secret`
    /// - `projects/...` -> used as-is
    pub fn resource_name(&self, secret: &str) -> Result<String> {
        if secret.starts_with("projects/") {
            return Ok(secret.trim_end_matches('/').to_string());
        }

        if !crate::utils::VALID_SECRET_ID_REGEX.is_match(secret) {
            return Err(SecretsError::invalid_name(
                secret,
                "must be a secret id or projects/{project}/secrets/{id}",
            ));
        }

        let project = self.project_id.as_deref().ok_or_else(|| {
            SecretsError::invalid_name(
                secret,
                "short secret names need ROTATOR_GCP_PROJECT_ID or GCP_PROJECT_ID",
            )
        })?;

        Ok(format!("projects/{}/secrets/{}", project, secret))
    }
}

/// Split `projects/{p}/secrets/{s}` into `("projects/{p}", "{s}")`
#[cfg_attr(not(feature = "gcp"), allow(dead_code))]
fn split_resource_name(resource: &str) -> Result<(&str, &str)> {
    let idx = resource
        .find("/secrets/")
        .ok_or_else(|| SecretsError::invalid_name(resource, "missing /secrets/ segment"))?;
    let parent = &resource[..idx];
    let secret_id = &resource[idx + "/secrets/".len()..];
    if secret_id.is_empty() || secret_id.contains('/') {
        return Err(SecretsError::invalid_name(resource, "malformed secret id"));
    }
    Ok((parent, secret_id))
}

/// Extract the version id from `projects/.../versions/{id}`
#[cfg_attr(not(feature = "gcp"), allow(dead_code))]
fn version_id_from_name(name: &str) -> Option<&str> {
    name.rsplit_once("/versions/").map(|(_, id)| id).filter(|id| !id.is_empty())
}

/// Map a Secret Manager version state string to [`VersionState`]
#[cfg_attr(not(feature = "gcp"), allow(dead_code))]
fn parse_state(state: &str) -> Option<VersionState> {
    match state {
        "ENABLED" => Some(VersionState::Enabled),
        "DISABLED" => Some(VersionState::Disabled),
        "DESTROYED" => Some(VersionState::Destroyed),
        _ => None,
    }
}

/// Classify a GCP client error by its rendered message
#[cfg_attr(not(feature = "gcp"), allow(dead_code))]
fn classify_error(operation: &str, target: &str, message: String) -> SecretsError {
    if message.contains("NOT_FOUND") || message.contains("404") {
        SecretsError::not_found(target)
    } else if message.contains("PERMISSION_DENIED") || message.contains("403") {
        SecretsError::authentication_failed(format!(
            "Permission denied during {} on '{}': {}",
            operation, target, message
        ))
    } else if message.contains("FAILED_PRECONDITION") {
        SecretsError::invalid_transition(target, "-", message)
    } else {
        SecretsError::backend_error(format!("{} failed for '{}': {}", operation, target, message))
    }
}

/// Build an authenticator from `GOOGLE_APPLICATION_CREDENTIALS` or
/// Application Default Credentials
#[cfg(feature = "gcp")]
pub async fn build_authenticator() -> Result<GcpAuthenticator> {
    if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        let key = yup_oauth2::read_service_account_key(&path).await.map_err(|e| {
            SecretsError::config_error(format!("Failed to read GCP credentials at {}: {}", path, e))
        })?;
        return yup_oauth2::ServiceAccountAuthenticator::builder(key).build().await.map_err(|e| {
            SecretsError::authentication_failed(format!("Failed to build GCP authenticator: {}", e))
        });
    }

    let opts = yup_oauth2::ApplicationDefaultCredentialsFlowOpts::default();
    let auth = match yup_oauth2::ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
        yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => {
            builder.build().await
        }
        yup_oauth2::authenticator::ApplicationDefaultCredentialsTypes::InstanceMetadata(
            builder,
        ) => builder.build().await,
    };
    auth.map_err(|e| {
        SecretsError::authentication_failed(format!(
            "Failed to build GCP authenticator. Set GOOGLE_APPLICATION_CREDENTIALS or \
            run on GCP with a service account: {}",
            e
        ))
    })
}

/// GCP Secret Manager store
#[cfg(feature = "gcp")]
pub struct GcpSecretStore {
    hub: SecretManager<GcpConnector>,
    config: GcpStoreConfig,
}

#[cfg(feature = "gcp")]
impl std::fmt::Debug for GcpSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpSecretStore")
            .field("project_id", &self.config.project_id)
            .field("hub", &"[SecretManager]")
            .finish()
    }
}

#[cfg(feature = "gcp")]
impl GcpSecretStore {
    /// Create a new store with the given configuration
    pub async fn new(config: GcpStoreConfig) -> Result<Self> {
        let client =
            hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
                .build(
                    hyper_rustls::HttpsConnectorBuilder::new()
                        .with_native_roots()
                        .map_err(|e| {
                            SecretsError::config_error(format!(
                                "Failed to load native TLS roots: {}",
                                e
                            ))
                        })?
                        .https_or_http()
                        .enable_http2()
                        .build(),
                );
        let auth = build_authenticator().await?;
        let hub = SecretManager::new(client, auth);

        info!(project_id = ?config.project_id, "Initialized GCP Secret Manager store");

        Ok(Self { hub, config })
    }

    /// Create a store from environment configuration
    pub async fn from_env() -> Result<Self> {
        Self::new(GcpStoreConfig::from_env()).await
    }

    fn convert_version(
        resource: &str,
        version: google_secretmanager1::api::SecretVersion,
    ) -> Option<SecretVersion> {
        let name = version.name.as_deref()?;
        let id = version_id_from_name(name)?.to_string();
        let state = version.state.as_deref().and_then(parse_state);
        match (state, version.create_time) {
            (Some(state), Some(created_at)) => {
                Some(SecretVersion { id, created_at, state, disabled_at: None })
            }
            _ => {
                debug!(secret = %resource, version = %id, "Skipping version without state or create time");
                None
            }
        }
    }

    async fn create_secret(&self, resource: &str) -> Result<()> {
        use google_secretmanager1::api::{Automatic, Replication, Secret};

        let (parent, secret_id) = split_resource_name(resource)?;
        let secret = Secret {
            replication: Some(Replication { automatic: Some(Automatic::default()), ..Default::default() }),
            ..Default::default()
        };

        self.hub
            .projects()
            .secrets_create(secret, parent)
            .secret_id(secret_id)
            .doit()
            .await
            .map_err(|e| classify_error("create secret", resource, e.to_string()))?;

        info!(secret = %resource, "Created secret in GCP Secret Manager");
        Ok(())
    }

    async fn add_version(&self, resource: &str, payload: &SecretPayload) -> Result<SecretVersion> {
        use google_secretmanager1::api::{AddSecretVersionRequest, SecretPayload as GcpPayload};

        let request = AddSecretVersionRequest {
            payload: Some(GcpPayload {
                data: Some(payload.expose_secret().to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let (_, version) = self
            .hub
            .projects()
            .secrets_add_version(request, resource)
            .doit()
            .await
            .map_err(|e| classify_error("add version", resource, e.to_string()))?;

        Self::convert_version(resource, version).ok_or_else(|| {
            SecretsError::backend_error(format!("Malformed version returned for '{}'", resource))
        })
    }
}

#[cfg(feature = "gcp")]
#[async_trait]
impl SecretStore for GcpSecretStore {
    async fn create_version(&self, secret: &str, payload: SecretPayload) -> Result<SecretVersion> {
        let resource = self.config.resource_name(secret)?;

        match self.add_version(&resource, &payload).await {
            Err(SecretsError::NotFound { .. }) => {
                self.create_secret(&resource).await?;
                self.add_version(&resource, &payload).await
            }
            other => other,
        }
    }

    async fn list_versions(&self, secret: &str) -> Result<Vec<SecretVersion>> {
        let resource = self.config.resource_name(secret)?;
        let mut versions = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut call =
                self.hub.projects().secrets_versions_list(&resource).page_size(LIST_PAGE_SIZE);
            if let Some(token) = page_token.as_deref() {
                call = call.page_token(token);
            }

            let response = match call.doit().await {
                Ok((_, response)) => response,
                Err(e) => match classify_error("list versions", &resource, e.to_string()) {
                    SecretsError::NotFound { .. } => {
                        debug!(secret = %resource, "Secret does not exist yet");
                        return Ok(Vec::new());
                    }
                    err => {
                        error!(secret = %resource, error = %err, "Failed to list secret versions");
                        return Err(err);
                    }
                },
            };

            versions.extend(
                response
                    .versions
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|v| Self::convert_version(&resource, v)),
            );

            match response.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(versions)
    }

    async fn access_version(&self, secret: &str, version: &str) -> Result<SecretPayload> {
        let name = format!("{}/versions/{}", self.config.resource_name(secret)?, version);
        let (_, response) = self
            .hub
            .projects()
            .secrets_versions_access(&name)
            .doit()
            .await
            .map_err(|e| classify_error("access version", &name, e.to_string()))?;

        response
            .payload
            .and_then(|p| p.data)
            .map(SecretPayload::new)
            .ok_or_else(|| SecretsError::backend_error(format!("Version '{}' returned no payload", name)))
    }

    async fn disable_version(&self, secret: &str, version: &str) -> Result<()> {
        use google_secretmanager1::api::DisableSecretVersionRequest;

        let name = format!("{}/versions/{}", self.config.resource_name(secret)?, version);
        self.hub
            .projects()
            .secrets_versions_disable(DisableSecretVersionRequest::default(), &name)
            .doit()
            .await
            .map_err(|e| classify_error("disable version", &name, e.to_string()))?;

        info!(secret = %secret, version = %version, "Disabled secret version");
        Ok(())
    }

    async fn destroy_version(&self, secret: &str, version: &str) -> Result<()> {
        use google_secretmanager1::api::DestroySecretVersionRequest;

        let name = format!("{}/versions/{}", self.config.resource_name(secret)?, version);
        self.hub
            .projects()
            .secrets_versions_destroy(DestroySecretVersionRequest::default(), &name)
            .doit()
            .await
            .map_err(|e| classify_error("destroy version", &name, e.to_string()))?;

        info!(secret = %secret, version = %version, "Destroyed secret version");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(project: Option<&str>) -> GcpStoreConfig {
        GcpStoreConfig { project_id: project.map(String::from) }
    }

    #[test]
    fn test_resource_name_short_form() {
        let name = config(Some("my-project")).resource_name("ci-key").unwrap();
        assert_eq!(name, "projects/my-project/secrets/ci-key");
    }

    #[test]
    fn test_resource_name_full_path() {
        let name = config(None).resource_name("projects/other/secrets/ci-key").unwrap();
        assert_eq!(name, "projects/other/secrets/ci-key");
    }

    #[test]
    fn test_resource_name_short_form_needs_project() {
        let err = config(None).resource_name("ci-key").unwrap_err();
        assert!(matches!(err, SecretsError::InvalidName { .. }));
    }

    #[test]
    fn test_resource_name_rejects_garbage() {
        let err = config(Some("p")).resource_name("not a name").unwrap_err();
        assert!(matches!(err, SecretsError::InvalidName { .. }));
    }

    #[test]
    fn test_split_resource_name() {
        let (parent, id) = split_resource_name("projects/p1/secrets/s1").unwrap();
        assert_eq!(parent, "projects/p1");
        assert_eq!(id, "s1");

        assert!(split_resource_name("projects/p1").is_err());
        assert!(split_resource_name("projects/p1/secrets/").is_err());
    }

    #[test]
    fn test_version_id_from_name() {
        assert_eq!(version_id_from_name("projects/1/secrets/s/versions/7"), Some("7"));
        assert_eq!(version_id_from_name("projects/1/secrets/s"), None);
        assert_eq!(version_id_from_name("projects/1/secrets/s/versions/"), None);
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("ENABLED"), Some(VersionState::Enabled));
        assert_eq!(parse_state("DISABLED"), Some(VersionState::Disabled));
        assert_eq!(parse_state("DESTROYED"), Some(VersionState::Destroyed));
        assert_eq!(parse_state("STATE_UNSPECIFIED"), None);
    }

    #[test]
    fn test_classify_error() {
        let err = classify_error("list", "s", "Error 404: NOT_FOUND".to_string());
        assert!(matches!(err, SecretsError::NotFound { .. }));

        let err = classify_error("list", "s", "PERMISSION_DENIED".to_string());
        assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));

        let err = classify_error("destroy", "s", "FAILED_PRECONDITION".to_string());
        assert!(matches!(err, SecretsError::InvalidTransition { .. }));

        let err = classify_error("list", "s", "connection reset".to_string());
        assert!(matches!(err, SecretsError::BackendError { .. }));
    }

    #[test]
    fn test_config_from_env() {
        // Unique names so parallel tests never see each other's values
        let primary = "SECRET_ROTATOR_TEST_FROM_ENV_PRIMARY";
        let fallback = "SECRET_ROTATOR_TEST_FROM_ENV_FALLBACK";

        std::env::set_var(fallback, "fallback-project");
        assert_eq!(
            GcpStoreConfig::from_env_vars(primary, fallback).project_id.as_deref(),
            Some("fallback-project")
        );

        std::env::set_var(primary, "env-project");
        assert_eq!(
            GcpStoreConfig::from_env_vars(primary, fallback).project_id.as_deref(),
            Some("env-project")
        );

        std::env::remove_var(primary);
        std::env::set_var(fallback, "");
        assert!(GcpStoreConfig::from_env_vars(primary, fallback).project_id.is_none());

        std::env::remove_var(fallback);
    }
}
