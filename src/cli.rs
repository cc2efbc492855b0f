//! # Command Line Interface
//!
//! Flags for the `secret-rotator` binary. Every flag can also be set through
//! a `ROTATOR_*` environment variable (a `.env` file is honoured).

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AppSettings, StoreKind};
use crate::errors::{Result, RotatorError};

#[derive(Parser, Debug, Clone)]
#[command(name = "secret-rotator")]
#[command(about = "Periodically rotate secrets held in a versioned secret store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to the rotation config YAML
    #[arg(long, env = "ROTATOR_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Time between reconciliation passes, in seconds or with a unit (60, 5m)
    #[arg(long, env = "ROTATOR_PERIOD", default_value = "60s", value_parser = parse_period)]
    pub period: Duration,

    /// Destroy disabled versions once their retention period has passed
    #[arg(long, env = "ROTATOR_ENABLE_DELETION")]
    pub enable_deletion: bool,

    /// Run a single pass and exit
    #[arg(long, env = "ROTATOR_RUN_ONCE")]
    pub run_once: bool,

    /// Print the actions a pass would take and exit without changing anything
    #[arg(long, conflicts_with = "run_once")]
    pub dry_run: bool,

    /// Secrets reconciled concurrently within a pass
    #[arg(long, env = "ROTATOR_MAX_CONCURRENCY", default_value_t = 4)]
    pub max_concurrency: usize,

    /// Secret store backend
    #[arg(long, env = "ROTATOR_STORE", value_enum, default_value_t = StoreKind::Gcp)]
    pub store: StoreKind,

    /// Log level when RUST_LOG is unset
    #[arg(long, env = "ROTATOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "ROTATOR_LOG_JSON")]
    pub log_json: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "ROTATOR_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_period(value: &str) -> std::result::Result<Duration, String> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Convert parsed flags into validated settings
    pub fn into_settings(self) -> Result<AppSettings> {
        let config_path = self.config_path.ok_or_else(|| {
            RotatorError::validation_field("required flag --config-path was unset", "config_path")
        })?;

        if self.period.subsec_nanos() != 0 {
            return Err(RotatorError::validation_field(
                format!("--period must be a whole number of seconds, got {:?}", self.period),
                "period",
            ));
        }

        let log_level = if self.verbose { "debug".to_string() } else { self.log_level };

        let settings = AppSettings {
            config_path,
            period_seconds: self.period.as_secs(),
            enable_deletion: self.enable_deletion,
            run_once: self.run_once,
            dry_run: self.dry_run,
            max_concurrency: self.max_concurrency,
            store: self.store,
            log_level,
            json_logging: self.log_json,
            metrics_port: self.metrics_port,
        };
        settings.validate()?;
        Ok(settings)
    }
}
