//! Pass reports.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::error::RotationError;
use super::policy::RotationAction;

/// What happened to one secret during a pass.
#[derive(Debug, Default)]
pub struct SecretOutcome {
    /// Actions that completed, in execution order
    pub applied: Vec<RotationAction>,
    /// The failure that stopped this secret's remaining actions, if any
    pub error: Option<RotationError>,
}

impl SecretOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Number of store-changing actions applied
    pub fn changes(&self) -> usize {
        self.applied.iter().filter(|a| **a != RotationAction::NoOp).count()
    }
}

/// Result of one reconciliation pass, keyed by secret name.
#[derive(Debug)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<String, SecretOutcome>,
}

impl PassReport {
    /// Whether every secret was reconciled without error
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(SecretOutcome::is_success)
    }

    /// Names of secrets whose reconciliation failed
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Total store-changing actions applied across all secrets
    pub fn changes(&self) -> usize {
        self.outcomes.values().map(SecretOutcome::changes).sum()
    }

    pub fn outcome(&self, secret: &str) -> Option<&SecretOutcome> {
        self.outcomes.get(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summaries() {
        let now = Utc::now();
        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            "a".to_string(),
            SecretOutcome {
                applied: vec![RotationAction::DisableVersion("1".into()), RotationAction::CreateVersion],
                error: None,
            },
        );
        outcomes.insert(
            "b".to_string(),
            SecretOutcome { applied: vec![], error: Some(RotationError::missing_provisioner("x")) },
        );
        outcomes.insert(
            "c".to_string(),
            SecretOutcome { applied: vec![RotationAction::NoOp], error: None },
        );

        let report = PassReport { started_at: now, finished_at: now, outcomes };
        assert!(!report.is_success());
        assert_eq!(report.failed(), vec!["b"]);
        assert_eq!(report.changes(), 2);
        assert!(report.outcome("c").unwrap().is_success());
    }

    #[test]
    fn test_empty_report_is_success() {
        let now = Utc::now();
        let report = PassReport { started_at: now, finished_at: now, outcomes: BTreeMap::new() };
        assert!(report.is_success());
        assert!(report.failed().is_empty());
    }
}
