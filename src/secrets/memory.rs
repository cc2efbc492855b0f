//! In-memory secret store.
//!
//! Keeps versions in process memory behind a `tokio::sync::RwLock`. Used by
//! the test suites and by `--store memory` for local dry runs of a rotation
//! config. Supports injecting failures per operation and secret so failure
//! isolation can be exercised without a real backend.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::{Result, SecretsError};
use super::store::SecretStore;
use super::types::{SecretPayload, SecretVersion, VersionState};
use crate::utils::{Clock, SystemClock};

/// Store operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Create,
    List,
    Access,
    Disable,
    Destroy,
}

#[derive(Debug)]
struct StoredVersion {
    version: SecretVersion,
    payload: Option<SecretPayload>,
}

#[derive(Debug, Default)]
struct StoredSecret {
    next_id: u64,
    versions: Vec<StoredVersion>,
}

/// Thread-safe in-memory [`SecretStore`].
#[derive(Debug, Clone)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, StoredSecret>>>,
    failures: Arc<RwLock<HashSet<(StoreOperation, String)>>>,
    clock: Arc<dyn Clock>,
    record_disable_time: bool,
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySecretStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping versions with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            secrets: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashSet::new())),
            clock,
            record_disable_time: true,
        }
    }

    /// Whether versions report `disabled_at` (default `true`).
    ///
    /// Turning this off mimics stores such as GCP Secret Manager that do not
    /// expose when a version was disabled.
    pub fn record_disable_time(mut self, enabled: bool) -> Self {
        self.record_disable_time = enabled;
        self
    }

    /// Make every `operation` against `secret` fail until cleared.
    pub async fn inject_failure(&self, operation: StoreOperation, secret: impl Into<String>) {
        self.failures.write().await.insert((operation, secret.into()));
    }

    /// Remove all injected failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Seed a version directly, bypassing the lifecycle.
    ///
    /// Version ids allocated afterwards by `create_version` continue after
    /// the highest numeric id seeded.
    pub async fn insert_version(&self, secret: impl Into<String>, version: SecretVersion) {
        let mut secrets = self.secrets.write().await;
        let stored = secrets.entry(secret.into()).or_default();
        if let Ok(id) = version.id.parse::<u64>() {
            stored.next_id = stored.next_id.max(id);
        }
        stored.versions.push(StoredVersion { version, payload: None });
    }

    /// Read the payload of a version, if it still holds material.
    pub async fn payload(&self, secret: &str, version: &str) -> Option<SecretPayload> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret)?
            .versions
            .iter()
            .find(|v| v.version.id == version)
            .and_then(|v| v.payload.clone())
    }

    /// Number of secrets known to the store.
    pub async fn secret_count(&self) -> usize {
        self.secrets.read().await.len()
    }

    async fn check_failure(&self, operation: StoreOperation, secret: &str) -> Result<()> {
        if self.failures.read().await.contains(&(operation, secret.to_string())) {
            return Err(SecretsError::connection_failed(format!(
                "injected {:?} failure for '{}'",
                operation, secret
            )));
        }
        Ok(())
    }

    async fn transition(
        &self,
        secret: &str,
        version: &str,
        next: VersionState,
    ) -> Result<()> {
        let now = self.clock.now();
        let mut secrets = self.secrets.write().await;
        let stored = secrets
            .get_mut(secret)
            .and_then(|s| s.versions.iter_mut().find(|v| v.version.id == version))
            .ok_or_else(|| SecretsError::not_found(format!("{}/versions/{}", secret, version)))?;

        if !stored.version.state.can_transition_to(next) {
            return Err(SecretsError::invalid_transition(
                secret,
                version,
                format!("cannot move from {} to {}", stored.version.state, next),
            ));
        }

        stored.version.state = next;
        match next {
            VersionState::Disabled if self.record_disable_time => {
                stored.version.disabled_at = Some(now);
            }
            VersionState::Destroyed => {
                stored.payload = None;
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn create_version(&self, secret: &str, payload: SecretPayload) -> Result<SecretVersion> {
        self.check_failure(StoreOperation::Create, secret).await?;

        if payload.is_empty() {
            return Err(SecretsError::backend_error(format!(
                "refusing to store empty payload for '{}'",
                secret
            )));
        }

        let now = self.clock.now();
        let mut secrets = self.secrets.write().await;
        let stored = secrets.entry(secret.to_string()).or_default();
        stored.next_id += 1;

        let version = SecretVersion::enabled(stored.next_id.to_string(), now);
        stored.versions.push(StoredVersion { version: version.clone(), payload: Some(payload) });

        tracing::debug!(secret = %secret, version = %version.id, "Created secret version in memory");
        Ok(version)
    }

    async fn list_versions(&self, secret: &str) -> Result<Vec<SecretVersion>> {
        self.check_failure(StoreOperation::List, secret).await?;

        let secrets = self.secrets.read().await;
        Ok(secrets
            .get(secret)
            .map(|s| s.versions.iter().map(|v| v.version.clone()).collect())
            .unwrap_or_default())
    }

    async fn access_version(&self, secret: &str, version: &str) -> Result<SecretPayload> {
        self.check_failure(StoreOperation::Access, secret).await?;

        let secrets = self.secrets.read().await;
        let stored = secrets
            .get(secret)
            .and_then(|s| s.versions.iter().find(|v| v.version.id == version))
            .ok_or_else(|| SecretsError::not_found(format!("{}/versions/{}", secret, version)))?;

        stored.payload.clone().ok_or_else(|| {
            SecretsError::invalid_transition(secret, version, "version holds no material")
        })
    }

    async fn disable_version(&self, secret: &str, version: &str) -> Result<()> {
        self.check_failure(StoreOperation::Disable, secret).await?;
        self.transition(secret, version, VersionState::Disabled).await
    }

    async fn destroy_version(&self, secret: &str, version: &str) -> Result<()> {
        self.check_failure(StoreOperation::Destroy, secret).await?;
        self.transition(secret, version, VersionState::Destroyed).await
    }
}
