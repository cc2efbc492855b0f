//! Common test utilities for all integration tests.
//!
//! Builds a rotator wired to an in-memory store and a manual clock so whole
//! rotation schedules can be driven without sleeping.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use secret_rotator::config::{ConfigAgent, RotationConfig, SecretSpec};
use secret_rotator::provisioners::{
    ProvisionError, ProvisionerRegistry, RandomProvisioner, SecretProvisioner,
};
use secret_rotator::rotation::{RotatorSettings, SecretRotator};
use secret_rotator::secrets::{InMemorySecretStore, SecretPayload, SecretVersion};
use secret_rotator::utils::ManualClock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const DAY: u64 = 86400;

/// Provisioner whose generation always fails.
pub struct BrokenProvisioner;

#[async_trait]
impl SecretProvisioner for BrokenProvisioner {
    fn secret_type(&self) -> &str {
        "broken"
    }

    async fn generate(
        &self,
        _spec: &SecretSpec,
        _existing: &[SecretVersion],
    ) -> Result<SecretPayload, ProvisionError> {
        Err(ProvisionError::backend("upstream unavailable"))
    }
}

/// Provisioner whose generation waits until released.
#[derive(Default)]
pub struct GatedProvisioner {
    calls: AtomicUsize,
    gate: Notify,
}

impl GatedProvisioner {
    /// Number of `generate` calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one waiting (or the next) generation finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl SecretProvisioner for GatedProvisioner {
    fn secret_type(&self) -> &str {
        "gated"
    }

    async fn generate(
        &self,
        _spec: &SecretSpec,
        _existing: &[SecretVersion],
    ) -> Result<SecretPayload, ProvisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(SecretPayload::from("gated"))
    }
}

pub struct TestRotator {
    pub store: Arc<InMemorySecretStore>,
    pub clock: ManualClock,
    pub agent: Arc<ConfigAgent>,
    pub gated: Arc<GatedProvisioner>,
    pub rotator: SecretRotator,
}

impl TestRotator {
    pub fn advance_days(&self, days: i64) {
        self.clock.advance(chrono::Duration::days(days));
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }
}

/// Options for [`rotator`]
pub struct Options {
    pub enable_deletion: bool,
    pub record_disable_time: bool,
    pub random_deletion: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { enable_deletion: false, record_disable_time: true, random_deletion: true }
    }
}

pub fn rotator(specs: Vec<SecretSpec>, options: Options) -> TestRotator {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let store = Arc::new(
        InMemorySecretStore::with_clock(Arc::new(clock.clone()))
            .record_disable_time(options.record_disable_time),
    );
    let agent = Arc::new(ConfigAgent::with_config(RotationConfig::new(specs).unwrap()));

    let random = if options.random_deletion {
        RandomProvisioner::new()
    } else {
        RandomProvisioner::without_deletion()
    };
    let gated = Arc::new(GatedProvisioner::default());
    let registry = ProvisionerRegistry::new()
        .with(Arc::new(random))
        .with(Arc::new(BrokenProvisioner))
        .with(gated.clone());

    let settings = RotatorSettings {
        period: Duration::from_millis(20),
        enable_deletion: options.enable_deletion,
        max_concurrency: 4,
    };

    let rotator = SecretRotator::new(store.clone(), agent.clone(), Arc::new(registry), settings)
        .with_clock(Arc::new(clock.clone()));

    TestRotator { store, clock, agent, gated, rotator }
}

/// The k1 declaration: rotate every 30 days, 2 day overlap, 7 day retention.
pub fn k1() -> SecretSpec {
    spec("k1")
}

pub fn spec(name: &str) -> SecretSpec {
    SecretSpec::new(name, "random", Duration::from_secs(30 * DAY))
        .with_overlap(Duration::from_secs(2 * DAY))
        .with_retention(Duration::from_secs(7 * DAY))
}
