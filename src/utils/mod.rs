//! Utility functions and helpers

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use regex::Regex;

/// Regex for validating short secret ids
/// Ids may contain letters, numbers, underscores and hyphens, up to 255 characters
pub static VALID_SECRET_ID_REGEX: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,255}$").unwrap());

/// Regex for validating fully qualified secret resource names
pub static SECRET_RESOURCE_REGEX: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"^projects/[a-z0-9-]+/secrets/[a-zA-Z0-9_-]{1,255}$").unwrap()
});

/// Whether `name` is a valid short secret id or fully qualified resource name
pub fn is_valid_secret_name(name: &str) -> bool {
    VALID_SECRET_ID_REGEX.is_match(name) || SECRET_RESOURCE_REGEX.is_match(name)
}
