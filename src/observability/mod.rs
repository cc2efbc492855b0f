//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the rotator.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_settings_info, LoggingConfig};
pub use metrics::{init_metrics, MetricsRecorder};
