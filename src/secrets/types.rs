//! Secret version metadata and secure payload types.
//!
//! Payloads never appear in logs: [`SecretPayload`] redacts itself in `Debug`,
//! `Display` and serialization, and zeroes its memory on drop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Lifecycle state of a secret version.
///
/// Versions only ever move forward: `Enabled -> Disabled -> Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionState {
    Enabled,
    Disabled,
    Destroyed,
}

impl VersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Destroyed => "destroyed",
        }
    }

    /// Whether the store may move a version from `self` to `next`.
    pub fn can_transition_to(&self, next: VersionState) -> bool {
        matches!(
            (self, next),
            (Self::Enabled, Self::Disabled) | (Self::Disabled, Self::Destroyed)
        )
    }
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One version of a secret as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    /// Opaque version identifier
    pub id: String,

    /// When the store created this version
    pub created_at: DateTime<Utc>,

    /// Current lifecycle state
    pub state: VersionState,

    /// When the version was disabled, if the store reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl SecretVersion {
    /// Create an enabled version.
    pub fn enabled(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self { id: id.into(), created_at, state: VersionState::Enabled, disabled_at: None }
    }

    /// Create a disabled version, optionally with a known disable time.
    pub fn disabled(
        id: impl Into<String>,
        created_at: DateTime<Utc>,
        disabled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self { id: id.into(), created_at, state: VersionState::Disabled, disabled_at }
    }

    /// Create a destroyed version.
    pub fn destroyed(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self { id: id.into(), created_at, state: VersionState::Destroyed, disabled_at: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == VersionState::Enabled
    }
}

/// Freshly generated secret material.
///
/// # Security
///
/// - Debug output shows `SecretPayload([REDACTED; n bytes])`
/// - Display output shows `[REDACTED]`
/// - Serialization outputs `"[REDACTED]"`, never the bytes
/// - Memory is zeroed when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretPayload(Vec<u8>);

impl SecretPayload {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }

    /// Exposes the underlying bytes.
    ///
    /// Only for handing the payload to the store. Never log the result.
    pub fn expose_secret(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretPayload([REDACTED; {} bytes])", self.0.len())
    }
}

impl fmt::Display for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for SecretPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str("[REDACTED]")
    }
}

impl PartialEq for SecretPayload {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SecretPayload {}

impl From<String> for SecretPayload {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl From<&str> for SecretPayload {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}
