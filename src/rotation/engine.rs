//! # Rotation Engine
//!
//! Drives reconciliation passes. Each pass takes one config snapshot and, for
//! every declared secret independently, lists its versions, asks the
//! [`policy`](super::policy) what is due and applies it through the store
//! and the secret's provisioner. A failure is recorded for that secret and
//! the pass continues with the others.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::error::RotationError;
use super::ledger::DisableLedger;
use super::policy::{self, RotationAction};
use super::report::{PassReport, SecretOutcome};
use crate::config::{AppSettings, ConfigAgent, SecretSpec};
use crate::observability::MetricsRecorder;
use crate::provisioners::{ProvisionerRegistry, SecretProvisioner};
use crate::secrets::{SecretStore, SecretVersion};
use crate::utils::{Clock, SystemClock};

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatorSettings {
    /// Time between passes
    pub period: Duration,
    /// Destroy disabled versions once their retention period has passed
    pub enable_deletion: bool,
    /// Secrets reconciled concurrently within a pass
    pub max_concurrency: usize,
}

impl Default for RotatorSettings {
    fn default() -> Self {
        Self { period: Duration::from_secs(60), enable_deletion: false, max_concurrency: 4 }
    }
}

impl From<&AppSettings> for RotatorSettings {
    fn from(settings: &AppSettings) -> Self {
        Self {
            period: settings.period(),
            enable_deletion: settings.enable_deletion,
            max_concurrency: settings.max_concurrency,
        }
    }
}

/// Actions planned for one secret, with what is needed to apply them.
struct Planned {
    provisioner: Arc<dyn SecretProvisioner>,
    versions: Vec<SecretVersion>,
    actions: Vec<RotationAction>,
}

/// Periodic reconciler for declared secrets.
pub struct SecretRotator {
    store: Arc<dyn SecretStore>,
    agent: Arc<ConfigAgent>,
    registry: Arc<ProvisionerRegistry>,
    settings: RotatorSettings,
    clock: Arc<dyn Clock>,
    ledger: DisableLedger,
    pass_lock: Mutex<()>,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for SecretRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRotator")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("ledger_entries", &self.ledger.len())
            .finish()
    }
}

impl SecretRotator {
    pub fn new(
        store: Arc<dyn SecretStore>,
        agent: Arc<ConfigAgent>,
        registry: Arc<ProvisionerRegistry>,
        settings: RotatorSettings,
    ) -> Self {
        Self {
            store,
            agent,
            registry,
            settings,
            clock: Arc::new(SystemClock),
            ledger: DisableLedger::new(),
            pass_lock: Mutex::new(()),
            metrics: MetricsRecorder::new(),
        }
    }

    /// Use `clock` for every time decision.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &RotatorSettings {
        &self.settings
    }

    /// Run a pass every `period` until `stop` is cancelled.
    ///
    /// The first pass starts immediately. Cancellation is observed between
    /// passes; an in-flight pass always completes before this returns.
    pub async fn start(&self, stop: CancellationToken) {
        info!(
            period_secs = self.settings.period.as_secs_f64(),
            enable_deletion = self.settings.enable_deletion,
            "Secret rotator started"
        );

        let mut ticker = tokio::time::interval(self.settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    info!("Secret rotator stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.pass_lock.try_lock() {
                        Ok(_guard) => {
                            self.run_pass().await;
                        }
                        Err(_) => {
                            self.metrics.record_skipped_tick();
                            warn!("Previous rotation pass still running, skipping tick");
                        }
                    }
                }
            }
        }
    }

    /// Run exactly one pass, waiting for any pass already in flight.
    pub async fn run_once(&self) -> PassReport {
        let _guard = self.pass_lock.lock().await;
        self.run_pass().await
    }

    /// Compute the actions a pass would take right now without applying them.
    pub async fn plan_once(&self) -> BTreeMap<String, Result<Vec<RotationAction>, RotationError>> {
        let config = self.agent.current();
        let now = self.clock.now();

        // Futures are built up front so the stream holds no borrowing closure
        let planning: Vec<_> =
            config.specs.iter().map(|spec| self.preview_secret(spec, now)).collect();
        stream::iter(planning).buffer_unordered(self.concurrency()).collect().await
    }

    async fn preview_secret(
        &self,
        spec: &SecretSpec,
        now: DateTime<Utc>,
    ) -> (String, Result<Vec<RotationAction>, RotationError>) {
        let planned = self.plan_secret(spec, now, false).await.map(|p| p.actions);
        (spec.name.clone(), planned)
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrency.max(1)
    }

    async fn run_pass(&self) -> PassReport {
        let config = self.agent.current();
        let started_at = self.clock.now();
        let timer = Instant::now();
        let span = crate::pass_span!(specs = config.len());

        async {
            debug!("Rotation pass started");

            self.ledger.retain_secrets(config.specs.iter().map(|spec| spec.name.as_str()));

            let reconciles: Vec<_> =
                config.specs.iter().map(|spec| self.reconcile_secret(spec, started_at)).collect();
            let outcomes: BTreeMap<String, SecretOutcome> =
                stream::iter(reconciles).buffer_unordered(self.concurrency()).collect().await;

            let report = PassReport { started_at, finished_at: self.clock.now(), outcomes };
            let failed = report.failed();
            self.metrics.record_pass(timer.elapsed().as_secs_f64(), failed.len());

            if failed.is_empty() {
                info!(
                    secrets = report.outcomes.len(),
                    changes = report.changes(),
                    duration_ms = timer.elapsed().as_millis() as u64,
                    "Rotation pass complete"
                );
            } else {
                warn!(
                    secrets = report.outcomes.len(),
                    changes = report.changes(),
                    failed = ?failed,
                    duration_ms = timer.elapsed().as_millis() as u64,
                    "Rotation pass complete with failures"
                );
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn reconcile_secret(&self, spec: &SecretSpec, now: DateTime<Utc>) -> (String, SecretOutcome) {
        let span = crate::rotation_span!(spec.name, spec.secret_type);

        async {
            let mut outcome = SecretOutcome::default();
            if let Err(e) = self.apply(spec, now, &mut outcome.applied).await {
                if e.is_config_error() {
                    warn!(error = %e, "Skipping secret with invalid declaration");
                } else {
                    error!(error = %e, kind = e.kind(), "Secret rotation failed");
                }
                outcome.error = Some(e);
            }
            self.metrics.record_secret_outcome(&spec.name, outcome.is_success());
            (spec.name.clone(), outcome)
        }
        .instrument(span)
        .await
    }

    async fn plan_secret(
        &self,
        spec: &SecretSpec,
        now: DateTime<Utc>,
        record: bool,
    ) -> Result<Planned, RotationError> {
        spec.check().map_err(|e| RotationError::invalid_spec(e.to_string()))?;

        let provisioner = self
            .registry
            .get(&spec.secret_type)
            .ok_or_else(|| RotationError::missing_provisioner(&spec.secret_type))?;

        let mut versions = self
            .store
            .list_versions(&spec.name)
            .await
            .map_err(|source| RotationError::ListVersions { source })?;

        if record {
            self.ledger.observe(&spec.name, &mut versions, now);
        } else {
            self.ledger.annotate(&spec.name, &mut versions, now);
        }

        let deletion_allowed = self.settings.enable_deletion && provisioner.supports_deletion();
        let actions = policy::plan(spec, &versions, now, deletion_allowed);
        debug!(versions = versions.len(), actions = ?actions, deletion_allowed, "Planned rotation");

        Ok(Planned { provisioner, versions, actions })
    }

    /// Apply due actions in order, stopping at the first failure.
    async fn apply(
        &self,
        spec: &SecretSpec,
        now: DateTime<Utc>,
        applied: &mut Vec<RotationAction>,
    ) -> Result<(), RotationError> {
        let Planned { provisioner, versions, actions } = self.plan_secret(spec, now, true).await?;

        for action in actions {
            match &action {
                RotationAction::NoOp => {}
                RotationAction::DisableVersion(version) => {
                    if provisioner.retires_material() {
                        self.retire(spec, provisioner.as_ref(), version).await?;
                    }
                    self.store.disable_version(&spec.name, version).await.map_err(|source| {
                        RotationError::DisableVersion { version: version.clone(), source }
                    })?;
                    self.ledger.record(&spec.name, version, self.clock.now());
                    info!(version = %version, "Disabled secret version");
                }
                RotationAction::DestroyVersion(version) => {
                    self.store.destroy_version(&spec.name, version).await.map_err(|source| {
                        RotationError::DestroyVersion { version: version.clone(), source }
                    })?;
                    info!(version = %version, "Destroyed secret version");
                }
                RotationAction::CreateVersion => {
                    let payload = provisioner
                        .generate(spec, &versions)
                        .await
                        .map_err(|source| RotationError::Generate { source })?;
                    let created = self
                        .store
                        .create_version(&spec.name, payload)
                        .await
                        .map_err(|source| RotationError::CreateVersion { source })?;
                    info!(version = %created.id, "Created secret version");
                }
            }

            if action != RotationAction::NoOp {
                self.metrics.record_action(action.kind());
            }
            applied.push(action);
        }

        Ok(())
    }

    async fn retire(
        &self,
        spec: &SecretSpec,
        provisioner: &dyn SecretProvisioner,
        version: &str,
    ) -> Result<(), RotationError> {
        let payload = self.store.access_version(&spec.name, version).await.map_err(|source| {
            RotationError::AccessVersion { version: version.to_string(), source }
        })?;
        provisioner.retire(spec, &payload).await.map_err(|source| RotationError::RetireVersion {
            version: version.to_string(),
            source,
        })?;
        debug!(version = %version, "Retired version material");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RotationConfig;
    use crate::provisioners::{ProvisionError, RandomProvisioner};
    use crate::secrets::{InMemorySecretStore, SecretPayload, StoreOperation, VersionState};
    use crate::utils::ManualClock;

    const DAY: u64 = 86400;

    struct Harness {
        store: Arc<InMemorySecretStore>,
        clock: ManualClock,
        rotator: SecretRotator,
    }

    fn harness(specs: Vec<SecretSpec>, enable_deletion: bool) -> Harness {
        let registry = ProvisionerRegistry::new().with(Arc::new(RandomProvisioner::new()));
        harness_with(specs, enable_deletion, registry)
    }

    fn harness_with(
        specs: Vec<SecretSpec>,
        enable_deletion: bool,
        registry: ProvisionerRegistry,
    ) -> Harness {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(InMemorySecretStore::with_clock(Arc::new(clock.clone())));
        let agent = Arc::new(ConfigAgent::with_config(RotationConfig::new(specs).unwrap()));
        let registry = Arc::new(registry);
        let settings = RotatorSettings { enable_deletion, ..Default::default() };

        let rotator = SecretRotator::new(store.clone(), agent, registry, settings)
            .with_clock(Arc::new(clock.clone()));
        Harness { store, clock, rotator }
    }

    /// Hands out numbered payloads and remembers which ones were retired.
    #[derive(Default)]
    struct Tracked {
        issued: std::sync::atomic::AtomicUsize,
        retired: std::sync::Mutex<Vec<SecretPayload>>,
        fail_retire: bool,
    }

    #[async_trait::async_trait]
    impl SecretProvisioner for Tracked {
        fn secret_type(&self) -> &str {
            "tracked"
        }

        async fn generate(
            &self,
            _spec: &SecretSpec,
            _existing: &[SecretVersion],
        ) -> Result<SecretPayload, ProvisionError> {
            let n = self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(SecretPayload::from(format!("key-{n}")))
        }

        fn retires_material(&self) -> bool {
            true
        }

        async fn retire(&self, _spec: &SecretSpec, payload: &SecretPayload) -> Result<(), ProvisionError> {
            if self.fail_retire {
                return Err(ProvisionError::retirement("iam unavailable"));
            }
            self.retired.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    fn tracked(name: &str) -> SecretSpec {
        SecretSpec::new(name, "tracked", Duration::from_secs(30 * DAY))
            .with_overlap(Duration::from_secs(2 * DAY))
    }

    fn k1() -> SecretSpec {
        SecretSpec::new("k1", "random", Duration::from_secs(30 * DAY))
            .with_overlap(Duration::from_secs(2 * DAY))
            .with_retention(Duration::from_secs(7 * DAY))
    }

    #[tokio::test]
    async fn test_first_pass_creates_version() {
        let h = harness(vec![k1()], false);

        let report = h.rotator.run_once().await;
        assert!(report.is_success());
        assert_eq!(report.outcome("k1").unwrap().applied, vec![RotationAction::CreateVersion]);

        let versions = h.store.list_versions("k1").await.unwrap();
        assert_eq!(versions.len(), 1);
        assert!(versions[0].is_enabled());
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let h = harness(vec![k1()], false);
        h.rotator.run_once().await;

        let report = h.rotator.run_once().await;
        assert_eq!(report.outcome("k1").unwrap().applied, vec![RotationAction::NoOp]);
        assert_eq!(h.store.list_versions("k1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_provisioner_isolated() {
        let mut other = k1();
        other.name = "k2".to_string();
        other.secret_type = "unknown".to_string();
        let h = harness(vec![k1(), other], false);

        let report = h.rotator.run_once().await;
        assert_eq!(report.failed(), vec!["k2"]);
        assert!(matches!(
            report.outcome("k2").unwrap().error,
            Some(RotationError::MissingProvisioner { .. })
        ));
        assert_eq!(h.store.list_versions("k1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_action_stops_remaining_actions() {
        let h = harness(vec![k1()], false);
        h.rotator.run_once().await;
        h.clock.advance(chrono::Duration::days(30));
        h.rotator.run_once().await;
        h.clock.advance(chrono::Duration::days(31));

        // v1 due for disable, v2 due for rotation
        h.store.inject_failure(StoreOperation::Disable, "k1").await;
        let report = h.rotator.run_once().await;

        let outcome = report.outcome("k1").unwrap();
        assert!(outcome.applied.is_empty());
        assert!(matches!(outcome.error, Some(RotationError::DisableVersion { .. })));
        assert_eq!(h.store.list_versions("k1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_plan_once_does_not_touch_store() {
        let h = harness(vec![k1()], false);

        let plans = h.rotator.plan_once().await;
        assert_eq!(plans["k1"].as_ref().unwrap(), &vec![RotationAction::CreateVersion]);
        assert_eq!(h.store.secret_count().await, 0);
    }

    #[tokio::test]
    async fn test_ledger_drives_destruction_without_store_disable_time() {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(
            InMemorySecretStore::with_clock(Arc::new(clock.clone())).record_disable_time(false),
        );
        let agent = Arc::new(ConfigAgent::with_config(RotationConfig::new(vec![k1()]).unwrap()));
        let registry = Arc::new(ProvisionerRegistry::new().with(Arc::new(RandomProvisioner::new())));
        let settings = RotatorSettings { enable_deletion: true, ..Default::default() };
        let rotator = SecretRotator::new(store.clone(), agent, registry, settings)
            .with_clock(Arc::new(clock.clone()));

        rotator.run_once().await;
        clock.advance(chrono::Duration::days(30));
        rotator.run_once().await;
        clock.advance(chrono::Duration::days(2));
        rotator.run_once().await;

        let versions = store.list_versions("k1").await.unwrap();
        let v1 = versions.iter().find(|v| v.id == "1").unwrap();
        assert_eq!(v1.state, VersionState::Disabled);
        assert!(v1.disabled_at.is_none());

        clock.advance(chrono::Duration::days(6));
        rotator.run_once().await;
        let v1_state = store.list_versions("k1").await.unwrap()[0].state;
        assert_eq!(v1_state, VersionState::Disabled);

        clock.advance(chrono::Duration::days(1));
        let report = rotator.run_once().await;
        assert_eq!(
            report.outcome("k1").unwrap().applied,
            vec![RotationAction::DestroyVersion("1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_disable_retires_version_material() {
        let provisioner = Arc::new(Tracked::default());
        let h = harness_with(vec![tracked("sa")], false, ProvisionerRegistry::new().with(provisioner.clone()));

        h.rotator.run_once().await;
        h.clock.advance(chrono::Duration::days(30));
        h.rotator.run_once().await;
        assert!(provisioner.retired.lock().unwrap().is_empty());

        h.clock.advance(chrono::Duration::days(3));
        let report = h.rotator.run_once().await;
        assert_eq!(
            report.outcome("sa").unwrap().applied,
            vec![RotationAction::DisableVersion("1".to_string())]
        );
        assert_eq!(*provisioner.retired.lock().unwrap(), vec![SecretPayload::from("key-1")]);
    }

    #[tokio::test]
    async fn test_failed_retirement_keeps_version_enabled() {
        let provisioner = Arc::new(Tracked { fail_retire: true, ..Default::default() });
        let h = harness_with(vec![tracked("sa")], false, ProvisionerRegistry::new().with(provisioner));

        h.rotator.run_once().await;
        h.clock.advance(chrono::Duration::days(30));
        h.rotator.run_once().await;
        h.clock.advance(chrono::Duration::days(3));

        let report = h.rotator.run_once().await;
        let outcome = report.outcome("sa").unwrap();
        assert!(outcome.applied.is_empty());
        assert!(matches!(outcome.error, Some(RotationError::RetireVersion { .. })));
        assert!(h.store.list_versions("sa").await.unwrap().iter().all(|v| v.is_enabled()));
    }

    #[tokio::test]
    async fn test_pass_drops_ledger_entries_of_removed_secrets() {
        let h = harness(vec![k1()], false);
        h.rotator.ledger.record("retired-secret", "1", h.clock.now());

        h.rotator.run_once().await;
        assert!(h.rotator.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let h = harness(vec![k1()], false);
        let rotator = Arc::new(h.rotator);
        let stop = CancellationToken::new();

        let task = {
            let rotator = rotator.clone();
            let stop = stop.clone();
            tokio::spawn(async move { rotator.start(stop).await })
        };

        for _ in 0..100 {
            if h.store.secret_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.store.secret_count().await, 1);

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
