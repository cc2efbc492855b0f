//! # Secret Rotation
//!
//! The reconciliation engine and the lifecycle policy it applies.

pub mod engine;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod report;

pub use engine::{RotatorSettings, SecretRotator};
pub use error::RotationError;
pub use ledger::DisableLedger;
pub use policy::{plan, RotationAction};
pub use report::{PassReport, SecretOutcome};
