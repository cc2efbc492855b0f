//! # Configuration Management
//!
//! Secret declarations ([`RotationConfig`]) are loaded from a [`ConfigSource`]
//! and published by the [`ConfigAgent`]; process settings ([`AppSettings`])
//! come from the command line and environment.

pub mod agent;
pub mod settings;
pub mod source;

pub use agent::{ConfigAgent, ConfigWatcher};
pub use settings::{AppSettings, RotationConfig, SecretSpec, StoreKind};
pub use source::{ConfigChanges, ConfigSource, FileConfigSource, StaticConfigSource};
