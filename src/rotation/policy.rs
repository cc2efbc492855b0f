//! # Lifecycle Policy
//!
//! Decides, from a secret's spec and the versions the store reports, which
//! actions are due right now. The policy is a pure function of its inputs:
//! planning twice without a store change yields the same actions.
//!
//! Three independent triggers:
//!
//! 1. **Rotation**: no Enabled version exists, or the newest Enabled version
//!    is at least `rotation_period` old.
//! 2. **Deactivation**: an Enabled version that is not the newest one is
//!    disabled once it is at least `overlap_period` old. A sole Enabled
//!    version is never disabled.
//! 3. **Destruction**: only when deletion is allowed, a Disabled version with
//!    a known disable time is destroyed once `retention_period` has passed
//!    since it was disabled.
//!
//! Actions are emitted as disables, then destroys, then at most one create.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::SecretSpec;
use crate::secrets::{SecretVersion, VersionState};

/// One step toward the desired state of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "version", rename_all = "snake_case")]
pub enum RotationAction {
    CreateVersion,
    DisableVersion(String),
    DestroyVersion(String),
    NoOp,
}

impl RotationAction {
    /// Label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateVersion => "create_version",
            Self::DisableVersion(_) => "disable_version",
            Self::DestroyVersion(_) => "destroy_version",
            Self::NoOp => "no_op",
        }
    }
}

impl fmt::Display for RotationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateVersion => f.write_str("create"),
            Self::DisableVersion(id) => write!(f, "disable({})", id),
            Self::DestroyVersion(id) => write!(f, "destroy({})", id),
            Self::NoOp => f.write_str("noop"),
        }
    }
}

/// Whether at least `period` has elapsed between `since` and `now`.
///
/// A timestamp in the future counts as no time elapsed.
fn has_elapsed(since: DateTime<Utc>, now: DateTime<Utc>, period: Duration) -> bool {
    match (now - since).to_std() {
        Ok(elapsed) => elapsed >= period,
        Err(_) => false,
    }
}

/// Compute the actions due for `spec` given its current `versions`.
///
/// `deletion_allowed` must already combine the process-wide deletion flag
/// with the provisioner's support for deletion.
pub fn plan(
    spec: &SecretSpec,
    versions: &[SecretVersion],
    now: DateTime<Utc>,
    deletion_allowed: bool,
) -> Vec<RotationAction> {
    let mut enabled: Vec<&SecretVersion> = versions.iter().filter(|v| v.is_enabled()).collect();
    enabled.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    let latest = enabled.last().copied();

    let mut actions: Vec<RotationAction> = enabled
        .iter()
        .filter(|v| latest.is_some_and(|l| l.id != v.id))
        .filter(|v| has_elapsed(v.created_at, now, spec.overlap_period))
        .map(|v| RotationAction::DisableVersion(v.id.clone()))
        .collect();

    if deletion_allowed {
        let mut disabled: Vec<(&SecretVersion, DateTime<Utc>)> = versions
            .iter()
            .filter(|v| v.state == VersionState::Disabled)
            .filter_map(|v| v.disabled_at.map(|at| (v, at)))
            .filter(|(_, at)| has_elapsed(*at, now, spec.retention_period))
            .collect();
        disabled.sort_by(|(a, a_at), (b, b_at)| a_at.cmp(b_at).then_with(|| a.id.cmp(&b.id)));
        actions.extend(disabled.into_iter().map(|(v, _)| RotationAction::DestroyVersion(v.id.clone())));
    }

    let rotation_due = match latest {
        None => true,
        Some(latest) => has_elapsed(latest.created_at, now, spec.rotation_period),
    };
    if rotation_due {
        actions.push(RotationAction::CreateVersion);
    }

    if actions.is_empty() {
        actions.push(RotationAction::NoOp);
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const DAY: u64 = 86400;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn k1() -> SecretSpec {
        SecretSpec::new("k1", "random", Duration::from_secs(30 * DAY))
            .with_overlap(Duration::from_secs(2 * DAY))
            .with_retention(Duration::from_secs(7 * DAY))
    }

    #[test]
    fn test_no_versions_creates() {
        assert_eq!(plan(&k1(), &[], t0(), true), vec![RotationAction::CreateVersion]);
    }

    #[test]
    fn test_only_disabled_versions_creates() {
        let versions = vec![SecretVersion::disabled("1", t0(), None)];
        assert_eq!(plan(&k1(), &versions, at(DAY as i64), false), vec![RotationAction::CreateVersion]);
    }

    #[test]
    fn test_fresh_version_is_noop() {
        let versions = vec![SecretVersion::enabled("1", t0())];
        assert_eq!(plan(&k1(), &versions, at(DAY as i64), true), vec![RotationAction::NoOp]);
    }

    #[test]
    fn test_rotation_due_keeps_sole_version() {
        let versions = vec![SecretVersion::enabled("1", t0())];
        let now = at(30 * DAY as i64 + 1);
        assert_eq!(plan(&k1(), &versions, now, true), vec![RotationAction::CreateVersion]);
    }

    #[test]
    fn test_rotation_due_exactly_at_period() {
        let versions = vec![SecretVersion::enabled("1", t0())];
        let now = at(30 * DAY as i64);
        assert_eq!(plan(&k1(), &versions, now, true), vec![RotationAction::CreateVersion]);
    }

    #[test]
    fn test_old_version_disabled_after_overlap() {
        let versions = vec![
            SecretVersion::enabled("v1", t0()),
            SecretVersion::enabled("v2", at(30 * DAY as i64)),
        ];
        let now = at(33 * DAY as i64);
        assert_eq!(
            plan(&k1(), &versions, now, false),
            vec![RotationAction::DisableVersion("v1".to_string())]
        );
    }

    #[test]
    fn test_overlap_measured_from_version_creation() {
        let spec = k1().with_overlap(Duration::from_secs(40 * DAY));
        let versions = vec![
            SecretVersion::enabled("v1", t0()),
            SecretVersion::enabled("v2", at(30 * DAY as i64)),
        ];
        assert_eq!(plan(&spec, &versions, at(39 * DAY as i64), false), vec![RotationAction::NoOp]);
        assert_eq!(
            plan(&spec, &versions, at(40 * DAY as i64), false),
            vec![RotationAction::DisableVersion("v1".to_string())]
        );
    }

    #[test]
    fn test_destruction_requires_deletion_allowed() {
        let versions = vec![
            SecretVersion::disabled("v1", t0(), Some(at(2 * DAY as i64))),
            SecretVersion::enabled("v2", at(DAY as i64)),
        ];
        let now = at(10 * DAY as i64);

        assert_eq!(plan(&k1(), &versions, now, false), vec![RotationAction::NoOp]);
        assert_eq!(
            plan(&k1(), &versions, now, true),
            vec![RotationAction::DestroyVersion("v1".to_string())]
        );
    }

    #[test]
    fn test_retention_counts_from_disable_time() {
        let versions = vec![
            SecretVersion::disabled("v1", t0(), Some(at(5 * DAY as i64))),
            SecretVersion::enabled("v2", at(DAY as i64)),
        ];
        assert_eq!(plan(&k1(), &versions, at(11 * DAY as i64), true), vec![RotationAction::NoOp]);
        assert_eq!(
            plan(&k1(), &versions, at(12 * DAY as i64), true),
            vec![RotationAction::DestroyVersion("v1".to_string())]
        );
    }

    #[test]
    fn test_unknown_disable_time_never_destroyed() {
        let versions = vec![
            SecretVersion::disabled("v1", t0(), None),
            SecretVersion::enabled("v2", at(DAY as i64)),
        ];
        assert_eq!(plan(&k1(), &versions, at(365 * DAY as i64), true)[0], RotationAction::CreateVersion);
    }

    #[test]
    fn test_action_order() {
        let versions = vec![
            SecretVersion::disabled("v1", t0(), Some(t0())),
            SecretVersion::enabled("v2", at(DAY as i64)),
            SecretVersion::enabled("v3", at(2 * DAY as i64)),
            SecretVersion::destroyed("v0", t0()),
        ];
        let now = at(60 * DAY as i64);
        assert_eq!(
            plan(&k1(), &versions, now, true),
            vec![
                RotationAction::DisableVersion("v2".to_string()),
                RotationAction::DestroyVersion("v1".to_string()),
                RotationAction::CreateVersion,
            ]
        );
    }

    #[test]
    fn test_future_timestamps_count_as_fresh() {
        let versions = vec![SecretVersion::enabled("1", at(DAY as i64))];
        assert_eq!(plan(&k1(), &versions, t0(), true), vec![RotationAction::NoOp]);
    }

    #[test]
    fn test_action_serialization() {
        let json = serde_json::to_value(RotationAction::DisableVersion("3".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "action": "disable_version", "version": "3" }));
        assert_eq!(RotationAction::CreateVersion.to_string(), "create");
    }

    fn state_strategy() -> impl Strategy<Value = VersionState> {
        prop_oneof![
            Just(VersionState::Enabled),
            Just(VersionState::Disabled),
            Just(VersionState::Destroyed),
        ]
    }

    fn versions_strategy() -> impl Strategy<Value = Vec<SecretVersion>> {
        prop::collection::vec(
            (0i64..90 * DAY as i64, state_strategy(), prop::option::of(0i64..90 * DAY as i64)),
            0..8,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (created, state, disabled))| SecretVersion {
                    id: (i + 1).to_string(),
                    created_at: at(created),
                    state,
                    disabled_at: if state == VersionState::Disabled { disabled.map(at) } else { None },
                })
                .collect()
        })
    }

    fn spec_strategy() -> impl Strategy<Value = SecretSpec> {
        (1u64..60 * DAY, 0u64..10 * DAY, 0u64..20 * DAY).prop_map(|(rotation, overlap, retention)| {
            SecretSpec::new("k", "random", Duration::from_secs(rotation))
                .with_overlap(Duration::from_secs(overlap))
                .with_retention(Duration::from_secs(retention))
        })
    }

    proptest! {
        #[test]
        fn plan_is_deterministic(
            spec in spec_strategy(),
            versions in versions_strategy(),
            now in 0i64..120 * DAY as i64,
            deletion in any::<bool>(),
        ) {
            prop_assert_eq!(
                plan(&spec, &versions, at(now), deletion),
                plan(&spec, &versions, at(now), deletion)
            );
        }

        #[test]
        fn plan_respects_lifecycle(
            spec in spec_strategy(),
            versions in versions_strategy(),
            now in 0i64..120 * DAY as i64,
            deletion in any::<bool>(),
        ) {
            let actions = plan(&spec, &versions, at(now), deletion);
            let state_of = |id: &str| versions.iter().find(|v| v.id == id).map(|v| v.state);

            prop_assert!(!actions.is_empty());
            prop_assert!(actions.iter().filter(|a| **a == RotationAction::CreateVersion).count() <= 1);
            if actions.contains(&RotationAction::NoOp) {
                prop_assert_eq!(actions.len(), 1);
            }

            for action in &actions {
                match action {
                    RotationAction::DestroyVersion(id) => {
                        prop_assert!(deletion);
                        prop_assert_eq!(state_of(id.as_str()), Some(VersionState::Disabled));
                    }
                    RotationAction::DisableVersion(id) => {
                        prop_assert_eq!(state_of(id.as_str()), Some(VersionState::Enabled));
                        let created = versions.iter().find(|v| &v.id == id).unwrap().created_at;
                        prop_assert!(has_elapsed(created, at(now), spec.overlap_period));
                    }
                    _ => {}
                }
            }

            let enabled = versions.iter().filter(|v| v.is_enabled()).count();
            let disables = actions.iter().filter(|a| matches!(a, RotationAction::DisableVersion(_))).count();
            prop_assert!(disables < enabled.max(1));
        }

        #[test]
        fn plan_orders_actions(
            spec in spec_strategy(),
            versions in versions_strategy(),
            now in 0i64..120 * DAY as i64,
        ) {
            let rank = |a: &RotationAction| match a {
                RotationAction::DisableVersion(_) => 0,
                RotationAction::DestroyVersion(_) => 1,
                RotationAction::CreateVersion => 2,
                RotationAction::NoOp => 3,
            };
            let actions = plan(&spec, &versions, at(now), true);
            prop_assert!(actions.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
        }
    }
}
