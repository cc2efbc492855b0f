//! # Structured Logging
//!
//! Subscriber setup and span macros for the rotator.
//!
//! `RUST_LOG` always wins over the configured level, so operators can turn on
//! `secret_rotator::rotation=debug` for a single run without touching flags.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{Result, RotatorError};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit one JSON object per line
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

impl LoggingConfig {
    fn filter(&self) -> Result<EnvFilter> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
            _ => EnvFilter::try_new(&self.level),
        }
        .map_err(|e| RotatorError::config(format!("Invalid log filter '{}': {}", self.level, e)))
    }
}

/// Install the global subscriber.
///
/// Calling this again once a subscriber is set (for instance from a test
/// harness) is not an error.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = config.filter()?;

    let installed = if config.json {
        tracing::subscriber::set_global_default(
            fmt().json().with_env_filter(filter).with_current_span(true).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(fmt().with_env_filter(filter).finish())
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already set, keeping it");
    }
    Ok(())
}

/// Create a span covering one reconciliation pass.
///
/// ```rust,ignore
/// let span = pass_span!(specs = config.len());
/// ```
#[macro_export]
macro_rules! pass_span {
    () => {
        tracing::info_span!("rotation_pass", pass_id = %uuid::Uuid::new_v4())
    };
    ($($field:tt)*) => {
        tracing::info_span!("rotation_pass", pass_id = %uuid::Uuid::new_v4(), $($field)*)
    };
}

/// Create a span covering the handling of one secret within a pass.
#[macro_export]
macro_rules! rotation_span {
    ($secret:expr) => {
        tracing::info_span!("rotate_secret", secret = %$secret, secret_type = tracing::field::Empty)
    };
    ($secret:expr, $secret_type:expr) => {
        tracing::info_span!("rotate_secret", secret = %$secret, secret_type = %$secret_type)
    };
    ($secret:expr, $secret_type:expr, $($field:tt)*) => {
        tracing::info_span!(
            "rotate_secret",
            secret = %$secret,
            secret_type = %$secret_type,
            $($field)*
        )
    };
}

/// Log process settings at startup
pub fn log_settings_info(settings: &crate::config::AppSettings) {
    tracing::info!(
        config_path = %settings.config_path.display(),
        period_seconds = settings.period_seconds,
        enable_deletion = settings.enable_deletion,
        run_once = settings.run_once,
        dry_run = settings.dry_run,
        max_concurrency = settings.max_concurrency,
        store = ?settings.store,
        "Secret rotator configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = pass_span!();
        let _span = pass_span!(specs = 3);
        let _span = rotation_span!("k1");
        let _span = rotation_span!("k1", "random");
        let _span = rotation_span!("k1", "random", versions = 2);
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&LoggingConfig { json: true, ..config }).is_ok());
    }

    #[test]
    fn test_log_settings_info() {
        log_settings_info(&crate::config::AppSettings::default());
    }
}
