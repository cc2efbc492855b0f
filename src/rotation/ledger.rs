//! Disable-time ledger.
//!
//! Some stores (GCP Secret Manager among them) do not report when a version
//! was disabled. The engine remembers when it disabled a version, or when it
//! first saw one already disabled, and uses that time as the start of the
//! retention period. The ledger lives in memory only; after a restart the
//! retention clock starts again from the first observation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;

use crate::secrets::{SecretVersion, VersionState};

#[derive(Debug, Default)]
pub struct DisableLedger {
    entries: DashMap<(String, String), DateTime<Utc>>,
}

impl DisableLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `version` of `secret` was disabled at `at`.
    pub fn record(&self, secret: &str, version: &str, at: DateTime<Utc>) {
        self.entries.insert((secret.to_string(), version.to_string()), at);
    }

    /// Drop entries of secrets not in `secrets`.
    pub fn retain_secrets<'a>(&self, secrets: impl IntoIterator<Item = &'a str>) {
        let keep: HashSet<&str> = secrets.into_iter().collect();
        self.entries.retain(|(secret, _), _| keep.contains(secret.as_str()));
    }

    /// Fill in missing `disabled_at` values, recording first observations.
    ///
    /// Entries for versions that are no longer disabled are dropped.
    pub fn observe(&self, secret: &str, versions: &mut [SecretVersion], now: DateTime<Utc>) {
        self.entries.retain(|(s, v), _| {
            s != secret
                || versions.iter().any(|version| &version.id == v && version.state == VersionState::Disabled)
        });

        for version in versions.iter_mut().filter(|v| v.state == VersionState::Disabled) {
            if version.disabled_at.is_some() {
                continue;
            }
            let at = *self
                .entries
                .entry((secret.to_string(), version.id.clone()))
                .or_insert(now);
            version.disabled_at = Some(at);
        }
    }

    /// Like [`DisableLedger::observe`] but never writes: versions not yet in
    /// the ledger are treated as disabled `now`.
    pub fn annotate(&self, secret: &str, versions: &mut [SecretVersion], now: DateTime<Utc>) {
        for version in versions.iter_mut().filter(|v| v.state == VersionState::Disabled) {
            if version.disabled_at.is_none() {
                let key = (secret.to_string(), version.id.clone());
                version.disabled_at = Some(self.entries.get(&key).map(|at| *at).unwrap_or(now));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
