//! GCP service account key provisioner
//!
//! Mints a new key for a service account through the IAM REST API and stores
//! the decoded JSON key file as the secret payload. When a version is
//! disabled, the key it holds is deleted from IAM if deletion is enabled;
//! otherwise the key is left active and a warning is logged.
//!
//! ```yaml
//! - name: ci-deployer-key
//!   type: service_account_key
//!   rotation_period: 30d
//!   overlap_period: 2d
//!   params:
//!     project: my-project      # optional, defaults to "-"
//!     service_account: ci-deployer@my-project.iam.gserviceaccount.com
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ProvisionError, SecretProvisioner};
use crate::config::SecretSpec;
use crate::secrets::backends::gcp::{build_authenticator, GcpAuthenticator, CLOUD_PLATFORM_SCOPE};
use crate::secrets::{SecretPayload, SecretVersion};

pub const SERVICE_ACCOUNT_KEY_TYPE: &str = "service_account_key";

const IAM_ENDPOINT: &str = "https://iam.googleapis.com/v1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountKey {
    name: String,
    private_key_data: String,
}

/// The fields of a JSON key file that identify the key in IAM
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    project_id: Option<String>,
    client_email: String,
    private_key_id: String,
}

/// IAM resource name of the key held in `payload`
fn key_resource_name(payload: &SecretPayload) -> Result<String, ProvisionError> {
    let file: CredentialsFile = serde_json::from_slice(payload.expose_secret())
        .map_err(|e| ProvisionError::retirement(format!("Payload is not a key file: {}", e)))?;
    let project = file.project_id.as_deref().filter(|p| !p.is_empty()).unwrap_or("-");

    Ok(format!(
        "projects/{}/serviceAccounts/{}/keys/{}",
        project, file.client_email, file.private_key_id
    ))
}

/// Provisioner for secrets of type `service_account_key`.
pub struct ServiceAccountKeyProvisioner {
    auth: GcpAuthenticator,
    http: reqwest::Client,
    endpoint: String,
    deletion: bool,
}

impl std::fmt::Debug for ServiceAccountKeyProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKeyProvisioner")
            .field("endpoint", &self.endpoint)
            .field("deletion", &self.deletion)
            .finish()
    }
}

impl ServiceAccountKeyProvisioner {
    /// Build with default credentials. `deletion` is reported as-is through
    /// [`SecretProvisioner::supports_deletion`].
    pub async fn new(deletion: bool) -> Result<Self, ProvisionError> {
        let auth = build_authenticator().await.map_err(|e| ProvisionError::backend(e.to_string()))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("secret-rotator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { auth, http, endpoint: IAM_ENDPOINT.to_string(), deletion })
    }

    fn keys_url(&self, spec: &SecretSpec) -> Result<String, ProvisionError> {
        keys_url(&self.endpoint, spec)
    }

    async fn access_token(&self) -> Result<String, ProvisionError> {
        let token = self
            .auth
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| ProvisionError::backend(format!("Failed to obtain access token: {}", e)))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::backend("Access token response carried no token"))
    }
}

fn keys_url(endpoint: &str, spec: &SecretSpec) -> Result<String, ProvisionError> {
    let account = spec
        .param_str("service_account")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProvisionError::invalid_params("service_account is required"))?;
    let project = spec.param_str("project").filter(|s| !s.is_empty()).unwrap_or("-");

    Ok(format!("{}/projects/{}/serviceAccounts/{}/keys", endpoint, project, account))
}

#[async_trait]
impl SecretProvisioner for ServiceAccountKeyProvisioner {
    fn secret_type(&self) -> &str {
        SERVICE_ACCOUNT_KEY_TYPE
    }

    async fn generate(
        &self,
        spec: &SecretSpec,
        _existing: &[SecretVersion],
    ) -> Result<SecretPayload, ProvisionError> {
        let url = self.keys_url(spec)?;
        let token = self.access_token().await?;

        debug!(secret = %spec.name, "Requesting new service account key");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "privateKeyType": "TYPE_GOOGLE_CREDENTIALS_FILE" }))
            .send()
            .await
            .map_err(|e| ProvisionError::backend(format!("IAM request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::backend(format!("IAM returned {}: {}", status, body)));
        }

        let key: ServiceAccountKey = response
            .json()
            .await
            .map_err(|e| ProvisionError::generation(format!("Malformed IAM key response: {}", e)))?;

        let decoded = STANDARD
            .decode(key.private_key_data.as_bytes())
            .map_err(|e| ProvisionError::generation(format!("Key data is not base64: {}", e)))?;

        info!(secret = %spec.name, key = %key.name, "Created service account key");
        Ok(SecretPayload::new(decoded))
    }

    fn supports_deletion(&self) -> bool {
        self.deletion
    }

    fn retires_material(&self) -> bool {
        true
    }

    async fn retire(&self, spec: &SecretSpec, payload: &SecretPayload) -> Result<(), ProvisionError> {
        let key = key_resource_name(payload)?;
        if !self.deletion {
            warn!(secret = %spec.name, key = %key, "Leaving service account key active, deletion is disabled");
            return Ok(());
        }

        let token = self.access_token().await?;
        let response = self
            .http
            .delete(format!("{}/{}", self.endpoint, key))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProvisionError::backend(format!("IAM request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(secret = %spec.name, key = %key, "Service account key already deleted");
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::retirement(format!("IAM returned {}: {}", status, body)));
        }

        info!(secret = %spec.name, key = %key, "Deleted service account key");
        Ok(())
    }
}
