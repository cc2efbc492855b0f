//! Remote secret store backends
//!
//! ## Supported Backends
//!
//! - **GCP Secret Manager**: (Optional feature `gcp`)

pub mod gcp;

pub use gcp::GcpStoreConfig;
#[cfg(feature = "gcp")]
pub use gcp::GcpSecretStore;
