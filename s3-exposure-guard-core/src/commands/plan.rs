//! Remediation planning: decide, per target, whether the current mode runs on it.
//!
//! Planning never touches the storage service, so `--dry-run` can print it as is.

use crate::types::{PlannedAction, RemediationMode, RemediationTarget, SkipReason, TargetAction};
use log::{debug, info};

/// Map every target to an execution or a skip, in target order.
///
/// A target only executes when its action is the one this mode handles. KEEP targets
/// and targets marked for a different mode are skipped, so a `delete` run can never
/// reach a bucket the reviewer marked RESTRICT.
pub fn plan_remediation(
    targets: &[RemediationTarget],
    mode: RemediationMode,
) -> Vec<PlannedAction> {
    let required = mode.required_action();

    let plan: Vec<PlannedAction> = targets
        .iter()
        .map(|target| match target.action {
            action if action == required => PlannedAction::Execute {
                bucket: target.bucket.clone(),
                mode,
            },
            TargetAction::Keep => PlannedAction::Skip {
                bucket: target.bucket.clone(),
                action: TargetAction::Keep,
                reason: SkipReason::KeepListed,
            },
            action => PlannedAction::Skip {
                bucket: target.bucket.clone(),
                action,
                reason: SkipReason::ActionMismatch,
            },
        })
        .collect();

    for step in &plan {
        match step {
            PlannedAction::Execute { bucket, mode } => {
                debug!("Plan: {:?} bucket {}", mode, bucket);
            }
            PlannedAction::Skip {
                bucket,
                action,
                reason,
            } => debug!("Plan: skip bucket {} ({}, {:?})", bucket, action, reason),
        }
    }
    let executions = plan
        .iter()
        .filter(|p| matches!(p, PlannedAction::Execute { .. }))
        .count();
    info!(
        "Planned {:?} for {} of {} targets",
        mode,
        executions,
        plan.len()
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn targets() -> Vec<RemediationTarget> {
        vec![
            RemediationTarget::new("a", TargetAction::Keep),
            RemediationTarget::new("b", TargetAction::Delete),
            RemediationTarget::new("c", TargetAction::Restrict),
            RemediationTarget::new("d", TargetAction::Unrestrict),
        ]
    }

    #[test]
    fn test_delete_plan() {
        let plan = plan_remediation(&targets(), RemediationMode::Delete);
        assert_eq!(
            plan,
            vec![
                PlannedAction::Skip {
                    bucket: "a".to_string(),
                    action: TargetAction::Keep,
                    reason: SkipReason::KeepListed,
                },
                PlannedAction::Execute {
                    bucket: "b".to_string(),
                    mode: RemediationMode::Delete,
                },
                PlannedAction::Skip {
                    bucket: "c".to_string(),
                    action: TargetAction::Restrict,
                    reason: SkipReason::ActionMismatch,
                },
                PlannedAction::Skip {
                    bucket: "d".to_string(),
                    action: TargetAction::Unrestrict,
                    reason: SkipReason::ActionMismatch,
                },
            ]
        );
    }

    #[test]
    fn test_restrict_plan_executes_only_restrict() {
        let plan = plan_remediation(&targets(), RemediationMode::Restrict);
        let executed: Vec<&str> = plan
            .iter()
            .filter(|p| matches!(p, PlannedAction::Execute { .. }))
            .map(PlannedAction::bucket)
            .collect();
        assert_eq!(executed, vec!["c"]);
    }

    #[test]
    fn test_empty_targets() {
        assert!(plan_remediation(&[], RemediationMode::Unrestrict).is_empty());
    }

    fn arb_action() -> impl Strategy<Value = TargetAction> {
        prop_oneof![
            Just(TargetAction::Keep),
            Just(TargetAction::Delete),
            Just(TargetAction::Restrict),
            Just(TargetAction::Unrestrict),
        ]
    }

    fn arb_mode() -> impl Strategy<Value = RemediationMode> {
        prop_oneof![
            Just(RemediationMode::Delete),
            Just(RemediationMode::Restrict),
            Just(RemediationMode::Unrestrict),
        ]
    }

    proptest! {
        #[test]
        fn prop_keep_never_executes(
            actions in prop::collection::vec(arb_action(), 0..20),
            mode in arb_mode(),
        ) {
            let targets: Vec<RemediationTarget> = actions
                .iter()
                .enumerate()
                .map(|(i, action)| RemediationTarget::new(format!("bucket-{i}"), *action))
                .collect();
            let plan = plan_remediation(&targets, mode);

            prop_assert_eq!(plan.len(), targets.len());
            for (target, step) in targets.iter().zip(&plan) {
                prop_assert_eq!(step.bucket(), target.bucket.as_str());
                let executes = matches!(step, PlannedAction::Execute { .. });
                prop_assert_eq!(executes, target.action == mode.required_action());
                if target.action == TargetAction::Keep {
                    prop_assert!(!executes);
                }
            }
        }
    }
}
