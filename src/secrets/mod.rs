//! Secret store abstraction for rotated secrets.
//!
//! The rotation engine talks to the remote secret-versioning store only
//! through the [`SecretStore`] port: create a version, list versions, disable
//! a version, destroy a version. Every rotation decision is derived from the
//! version metadata this port reports at each tick, so the store is the only
//! source of truth and the rotator keeps no database of its own.
//!
//! # Supported Stores
//!
//! - **In-memory**: [`InMemorySecretStore`] for tests and local dry runs
//! - **GCP Secret Manager**: [`backends::GcpSecretStore`] (feature `gcp`)
//!
//! # Security Considerations
//!
//! - Payloads are carried as [`SecretPayload`], which never prints its bytes
//! - Payload memory is zeroed on drop
//! - Stores must never log payloads

pub mod backends;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{Result, SecretsError};
pub use memory::{InMemorySecretStore, StoreOperation};
pub use store::SecretStore;
pub use types::{SecretPayload, SecretVersion, VersionState};
