//! # Metrics Collection
//!
//! Prometheus metrics for rotation passes. Without an installed exporter the
//! `metrics` macros are no-ops, so the engine records unconditionally.

use ::tracing::info;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

use crate::errors::{Result, RotatorError};

/// Records rotation metrics through the global `metrics` recorder
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a completed pass
    pub fn record_pass(&self, duration: f64, failed_secrets: usize) {
        let status = if failed_secrets == 0 { "success" } else { "partial_failure" };
        counter!("rotator_pass_total", "status" => status).increment(1);
        histogram!("rotator_pass_duration_seconds").record(duration);
    }

    /// Record the outcome for one secret within a pass
    pub fn record_secret_outcome(&self, secret: &str, success: bool) {
        let result = if success { "success" } else { "error" };
        let labels = [("secret", secret.to_string()), ("result", result.to_string())];
        counter!("rotator_secret_outcome_total", &labels).increment(1);
    }

    /// Record an applied action
    pub fn record_action(&self, action: &str) {
        let labels = [("action", action.to_string())];
        counter!("rotator_actions_total", &labels).increment(1);
    }

    /// Record a tick dropped because a pass was still running
    pub fn record_skipped_tick(&self) {
        counter!("rotator_skipped_ticks_total").increment(1);
    }

    /// Register metric descriptions
    pub fn register_rotation_metrics(&self) {
        describe_counter!("rotator_pass_total", Unit::Count, "Completed reconciliation passes");
        describe_histogram!(
            "rotator_pass_duration_seconds",
            Unit::Seconds,
            "Wall time of reconciliation passes"
        );
        describe_counter!(
            "rotator_secret_outcome_total",
            Unit::Count,
            "Per-secret pass outcomes by result"
        );
        describe_counter!("rotator_actions_total", Unit::Count, "Applied rotation actions by kind");
        describe_counter!(
            "rotator_skipped_ticks_total",
            Unit::Count,
            "Ticks skipped because a pass was still in flight"
        );
    }
}

/// Install the Prometheus exporter on `0.0.0.0:{port}`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", crate::APP_NAME)
        .install()
        .map_err(|e| RotatorError::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().register_rotation_metrics();

    info!(metrics_addr = %addr, "Metrics collection initialized");
    Ok(())
}
