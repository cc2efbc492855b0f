//! # Error Handling
//!
//! Crate-level error types for the secret rotator. Layer-specific errors
//! (store, provisioner, per-secret rotation outcome) live next to their
//! modules and convert into [`RotatorError`] where they cross into
//! process-level code.

pub mod types;

pub use types::{Result, RotatorError};
