//! # Secret Rotator
//!
//! Periodically rotates secrets held in a versioned secret store. Each
//! declared secret gets a fresh version on a schedule, older versions stay
//! enabled for an overlap period so consumers can migrate, and disabled
//! versions can be destroyed after a retention period.
//!
//! ## Architecture
//!
//! ```text
//! ConfigSource → ConfigAgent ──snapshot──┐
//!                                        ▼
//!          ProvisionerRegistry → SecretRotator → SecretStore
//!                                   │
//!                             lifecycle policy
//! ```
//!
//! All rotation state is derived from the store's version metadata on every
//! pass; the rotator keeps no database of its own.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use secret_rotator::config::{ConfigAgent, FileConfigSource};
//! use secret_rotator::provisioners::{ProvisionerRegistry, RandomProvisioner};
//! use secret_rotator::rotation::{RotatorSettings, SecretRotator};
//! use secret_rotator::secrets::InMemorySecretStore;
//!
//! # async fn example() -> secret_rotator::Result<()> {
//! let agent = Arc::new(ConfigAgent::new());
//! let _watcher = agent.watch_config(Arc::new(FileConfigSource::new("rotation.yaml"))).await?;
//!
//! let registry = ProvisionerRegistry::new().with(Arc::new(RandomProvisioner::new()));
//! let rotator = SecretRotator::new(
//!     Arc::new(InMemorySecretStore::new()),
//!     agent,
//!     Arc::new(registry),
//!     RotatorSettings::default(),
//! );
//!
//! let report = rotator.run_once().await;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod provisioners;
pub mod rotation;
pub mod secrets;
pub mod utils;

pub use config::{ConfigAgent, RotationConfig, SecretSpec};
pub use errors::{Result, RotatorError};
pub use rotation::{PassReport, RotationAction, SecretRotator};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
