//! # Configuration Settings
//!
//! Two kinds of configuration live here:
//!
//! - [`RotationConfig`]: the hot-reloadable declaration of which secrets to
//!   manage and how often to rotate them, parsed from YAML.
//! - [`AppSettings`]: process settings (tick period, deletion flag, store
//!   selection, logging) assembled from CLI flags and the environment.

use crate::errors::{Result, RotatorError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// A declared secret to manage.
///
/// Identity is `name`. Specs are immutable values; a config change replaces
/// the whole [`RotationConfig`] rather than editing a live spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SecretSpec {
    /// Secret id or fully qualified resource name in the store
    #[validate(custom(function = "validate_secret_name"))]
    pub name: String,

    /// Selects the provisioner that generates new material
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "Secret type cannot be empty"))]
    pub secret_type: String,

    /// Time between new-version creations
    #[serde(with = "humantime_serde")]
    #[validate(custom(function = "validate_non_zero_period"))]
    pub rotation_period: Duration,

    /// How long an older version stays enabled, measured from its own creation
    #[serde(default, with = "humantime_serde")]
    pub overlap_period: Duration,

    /// How long a disabled version is kept before destruction
    #[serde(default, with = "humantime_serde")]
    pub retention_period: Duration,

    /// Provisioner-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
}

fn validate_secret_name(name: &str) -> std::result::Result<(), ValidationError> {
    if crate::utils::is_valid_secret_name(name) {
        Ok(())
    } else {
        Err(ValidationError::new("secret_name").with_message(
            "Secret name must be an id of letters, digits, '_' or '-', or projects/{project}/secrets/{id}"
                .into(),
        ))
    }
}

fn validate_non_zero_period(period: &Duration) -> std::result::Result<(), ValidationError> {
    if period.is_zero() {
        Err(ValidationError::new("rotation_period")
            .with_message("Rotation period must be greater than zero".into()))
    } else {
        Ok(())
    }
}

impl SecretSpec {
    /// Create a spec with no overlap, retention or params.
    pub fn new(
        name: impl Into<String>,
        secret_type: impl Into<String>,
        rotation_period: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            secret_type: secret_type.into(),
            rotation_period,
            overlap_period: Duration::ZERO,
            retention_period: Duration::ZERO,
            params: BTreeMap::new(),
        }
    }

    pub fn with_overlap(mut self, overlap: Duration) -> Self {
        self.overlap_period = overlap;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_period = retention;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Read a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Check this spec on its own.
    ///
    /// A spec failing this check is skipped for the pass and reported as a
    /// failure for that secret only.
    pub fn check(&self) -> Result<()> {
        Validate::validate(self).map_err(RotatorError::from)
    }
}

/// The declaration of every secret to manage.
///
/// Owned by the config agent and swapped atomically on change; consumers only
/// ever read a published snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub specs: Vec<SecretSpec>,
}

impl RotationConfig {
    /// Build a config, enforcing unique names.
    pub fn new(specs: Vec<SecretSpec>) -> Result<Self> {
        let config = Self { specs };
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML declaration.
    ///
    /// Structural errors and duplicate names reject the whole document.
    /// Individually malformed specs are kept and fail per secret at pass time.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RotationConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Document-level invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(RotatorError::validation_field(
                    format!("Duplicate secret name '{}'", spec.name),
                    "name",
                ));
            }
        }
        Ok(())
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&SecretSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Which secret store the process talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Process-local store, for dry runs of a config
    Memory,
    /// GCP Secret Manager (requires the `gcp` feature)
    Gcp,
}

/// Process settings for the rotator binary
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppSettings {
    /// Path to the rotation config YAML
    pub config_path: PathBuf,

    /// Seconds between reconciliation passes
    #[validate(range(min = 1, max = 86400, message = "Period must be between 1 and 86400 seconds"))]
    pub period_seconds: u64,

    /// Allow destroying disabled versions after their retention period
    pub enable_deletion: bool,

    /// Perform a single pass and exit
    pub run_once: bool,

    /// Plan a single pass without touching the store
    pub dry_run: bool,

    /// Secrets processed concurrently within a pass
    #[validate(range(min = 1, max = 64, message = "Concurrency must be between 1 and 64"))]
    pub max_concurrency: usize,

    /// Secret store backend
    pub store: StoreKind,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Emit JSON log lines
    pub json_logging: bool,

    /// Prometheus exporter port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config.yaml"),
            period_seconds: 60,
            enable_deletion: false,
            run_once: false,
            dry_run: false,
            max_concurrency: 4,
            store: StoreKind::Gcp,
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: None,
        }
    }
}

impl AppSettings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(RotatorError::from)?;

        if self.config_path.as_os_str().is_empty() {
            return Err(RotatorError::validation_field(
                "required flag --config-path was unset",
                "config_path",
            ));
        }

        Ok(())
    }

    /// Tick period as Duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }
}
