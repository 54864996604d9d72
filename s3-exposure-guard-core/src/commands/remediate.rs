//! Remediation logic for the S3 Exposure Guard service
//!
//! Each executed target is probed first, then dispatched to delete, restrict or
//! unrestrict. Errors are caught at the bucket boundary and become `Failed` outcomes;
//! the batch always runs to the end.

use super::plan::plan_remediation;
use crate::aws::{object_pages, StorageClient};
use crate::error::{ExposureGuardError, ExposureGuardResult};
use crate::policy::{guard_statement, insert_guard, remove_guard, GuardChange, PolicyDocument};
use crate::types::{
    AccessBlockConfiguration, BucketOutcome, Outcome, PlannedAction, RemediationMode,
    RemediationSummary, RemediationTarget, SkipReason,
};
use futures::{stream, StreamExt, TryStreamExt};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

impl<C: StorageClient> super::service::ExposureGuardService<C> {
    /// Plan and execute `mode` over the target list.
    pub async fn remediate(
        &self,
        targets: &[RemediationTarget],
        mode: RemediationMode,
        cancel: &CancellationToken,
    ) -> RemediationSummary {
        let plan = plan_remediation(targets, mode);
        self.apply_plan(&plan, cancel).await
    }

    /// Execute a plan. Outcomes come back in plan order.
    pub async fn apply_plan(
        &self,
        plan: &[PlannedAction],
        cancel: &CancellationToken,
    ) -> RemediationSummary {
        let run_id = Self::new_run_id();
        let started_at = chrono::Utc::now();
        info!("Applying plan of {} targets (run {})", plan.len(), run_id);

        let outcomes: Vec<BucketOutcome> = stream::iter(plan)
            .map(|step| async move {
                let outcome = match step {
                    PlannedAction::Skip {
                        bucket,
                        action,
                        reason,
                    } => {
                        info!("Bucket: {}, skipped ({}, {:?})", bucket, action, reason);
                        Outcome::Skipped(*reason)
                    }
                    PlannedAction::Execute { bucket, .. } if cancel.is_cancelled() => {
                        warn!("Bucket: {}, not started: run cancelled", bucket);
                        Outcome::Skipped(SkipReason::Cancelled)
                    }
                    PlannedAction::Execute { bucket, mode } => {
                        match self.execute(bucket, *mode).await {
                            Ok(()) => {
                                info!("Bucket: {}, {:?} succeeded", bucket, mode);
                                Outcome::Success
                            }
                            Err(e) => {
                                log_failure(bucket, *mode, &e);
                                Outcome::Failed(e.to_string())
                            }
                        }
                    }
                };
                BucketOutcome {
                    bucket: step.bucket().to_string(),
                    outcome,
                }
            })
            .buffered(self.config.bucket_concurrency)
            .collect()
            .await;

        let mut summary =
            RemediationSummary::from_outcomes(run_id, self.account_id.clone(), outcomes);
        summary.started_at = Some(started_at);
        info!(
            "Remediation finished: {} succeeded, {} skipped, {} failed",
            summary.success, summary.skipped, summary.failed
        );
        summary
    }

    async fn execute(&self, bucket: &str, mode: RemediationMode) -> ExposureGuardResult<()> {
        self.storage
            .head_bucket(bucket)
            .await
            .map_err(|source| ExposureGuardError::BucketUnreachable {
                bucket: bucket.to_string(),
                source,
            })?;

        match mode {
            RemediationMode::Delete => self.delete_bucket(bucket).await,
            RemediationMode::Restrict => self.restrict_bucket(bucket).await.map(|_| ()),
            RemediationMode::Unrestrict => self.unrestrict_bucket(bucket).await,
        }
    }

    /// Delete a bucket, emptying it first when `purge_objects_on_delete` is set.
    pub async fn delete_bucket(&self, bucket: &str) -> ExposureGuardResult<()> {
        if self.config.purge_objects_on_delete {
            let purged = self.purge_objects(bucket).await?;
            info!("Bucket: {}, deleted {} objects", bucket, purged);
        }
        self.storage.delete_bucket(bucket).await?;
        info!("Bucket: {} deleted", bucket);
        Ok(())
    }

    /// Delete every current object, one listing page per batch request.
    async fn purge_objects(&self, bucket: &str) -> ExposureGuardResult<usize> {
        let mut pages = Box::pin(object_pages(&self.storage, bucket));
        let mut purged = 0;
        while let Some(keys) = pages.try_next().await? {
            if keys.is_empty() {
                continue;
            }
            self.storage.delete_objects(bucket, &keys).await?;
            info!("Bucket: {}, deleted batch of {} objects", bucket, keys.len());
            purged += keys.len();
        }
        Ok(purged)
    }

    /// Upsert the guard statement into the bucket policy and confirm it landed.
    pub async fn restrict_bucket(&self, bucket: &str) -> ExposureGuardResult<GuardChange> {
        let current = match self.read_policy(bucket, "Before Restriction").await? {
            Some(doc) => doc,
            None => {
                info!("Bucket: {} has no policy, creating one", bucket);
                PolicyDocument::new(Vec::new())
            }
        };

        let guard = guard_statement(&self.config.partition, bucket);
        let (updated, change) = insert_guard(current, guard);
        self.write_policy(bucket, &updated).await?;
        info!("Bucket: {}, guard statement {:?}", bucket, change);

        if self.config.block_public_access_on_restrict {
            self.storage
                .put_public_access_block(bucket, AccessBlockConfiguration::fully_blocked())
                .await?;
            info!("Bucket: {}, public access block fully enabled", bucket);
        }

        let after = self.read_policy(bucket, "After Restriction").await?;
        if !after.as_ref().is_some_and(PolicyDocument::has_guard) {
            return Err(ExposureGuardError::ConcurrentModification {
                bucket: bucket.to_string(),
                detail: "guard statement missing after write".to_string(),
            });
        }
        Ok(change)
    }

    /// Remove the guard statement by Sid and confirm it is gone.
    pub async fn unrestrict_bucket(&self, bucket: &str) -> ExposureGuardResult<()> {
        let no_guard = || ExposureGuardError::NoGuardPresent {
            bucket: bucket.to_string(),
        };

        let current = self
            .read_policy(bucket, "Before Unrestriction")
            .await?
            .ok_or_else(no_guard)?;
        let updated = remove_guard(current).map_err(|_| no_guard())?;

        if updated.statement.is_empty() {
            self.storage.delete_bucket_policy(bucket).await?;
            info!("Bucket: {}, policy deleted (no statements left)", bucket);
        } else {
            self.write_policy(bucket, &updated).await?;
        }

        let after = self.read_policy(bucket, "After Unrestriction").await?;
        if after.as_ref().is_some_and(PolicyDocument::has_guard) {
            return Err(ExposureGuardError::ConcurrentModification {
                bucket: bucket.to_string(),
                detail: "guard statement still present after removal".to_string(),
            });
        }
        Ok(())
    }

    /// Read and parse the bucket policy, logging the raw document under `stage`.
    async fn read_policy(
        &self,
        bucket: &str,
        stage: &str,
    ) -> ExposureGuardResult<Option<PolicyDocument>> {
        let Some(raw) = self.storage.get_bucket_policy(bucket).await? else {
            info!("Bucket: {}, Policy {}: none", bucket, stage);
            return Ok(None);
        };
        info!("Bucket: {}, Policy {}: {}", bucket, stage, raw);

        PolicyDocument::parse(&raw).map(Some).map_err(|e| {
            ExposureGuardError::MalformedPolicyDocument {
                bucket: bucket.to_string(),
                reason: e.to_string(),
                document: raw,
            }
        })
    }

    async fn write_policy(&self, bucket: &str, doc: &PolicyDocument) -> ExposureGuardResult<()> {
        let json = doc.to_json().map_err(|e| ExposureGuardError::MalformedPolicyDocument {
            bucket: bucket.to_string(),
            reason: format!("cannot serialize updated policy: {e}"),
            document: String::new(),
        })?;
        self.storage.put_bucket_policy(bucket, &json).await?;
        info!("Bucket: {}, policy written", bucket);
        Ok(())
    }
}

fn log_failure(bucket: &str, mode: RemediationMode, err: &ExposureGuardError) {
    error!("Bucket: {}, operation: {:?}, error: {}", bucket, mode, err);
    if let ExposureGuardError::MalformedPolicyDocument { document, .. } = err {
        error!("Bucket: {}, raw policy document: {}", bucket, document);
    }
}

#[cfg(test)]
mod tests {
    use crate::aws::{codes, AwsError};
    use crate::commands::ExposureGuardService;
    use crate::config::GuardConfig;
    use crate::policy::{PolicyDocument, GUARD_SID};
    use crate::testing::{MockBucket, MockStorage};
    use crate::types::{
        AccessBlockConfiguration, Outcome, RemediationMode, RemediationTarget, SkipReason,
        TargetAction,
    };
    use tokio_util::sync::CancellationToken;

    const ALLOW_POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Sid":"Allow1","Effect":"Allow","Principal":{"AWS":"arn:aws:iam::123456789012:root"},"Action":"s3:ListBucket","Resource":"arn:aws:s3:::media"}]}"#;

    fn service(storage: MockStorage) -> ExposureGuardService<MockStorage> {
        ExposureGuardService::with_client(storage, GuardConfig::default())
    }

    fn sids(policy: &str) -> Vec<Option<String>> {
        PolicyDocument::parse(policy)
            .unwrap()
            .statement
            .into_iter()
            .map(|s| s.sid)
            .collect()
    }

    #[tokio::test]
    async fn test_keep_delete_missing_scenario() {
        let storage = MockStorage::new().with_bucket("b", MockBucket::default());
        let service = service(storage);
        let targets = vec![
            RemediationTarget::new("a", TargetAction::Keep),
            RemediationTarget::new("b", TargetAction::Delete),
            RemediationTarget::new("c", TargetAction::Delete),
        ];

        let summary = service
            .remediate(&targets, RemediationMode::Delete, &CancellationToken::new())
            .await;

        assert_eq!((summary.skipped, summary.success, summary.failed), (1, 1, 1));
        assert_eq!(summary.outcomes[0].outcome, Outcome::Skipped(SkipReason::KeepListed));
        assert_eq!(summary.outcomes[1].outcome, Outcome::Success);
        assert!(summary.started_at.is_some());
        assert!(matches!(
            summary.outcomes[2].outcome,
            Outcome::Failed(ref r) if r.contains("unreachable")
        ));
        assert!(service.storage().calls_for("a").is_empty());
        assert!(!service.storage().exists("b"));
    }

    #[tokio::test]
    async fn test_restrict_then_unrestrict_restores_policy() {
        let storage = MockStorage::new()
            .with_bucket("media", MockBucket::default().with_policy(ALLOW_POLICY));
        let service = service(storage);
        let targets = vec![RemediationTarget::new("media", TargetAction::Restrict)];

        let summary = service
            .remediate(&targets, RemediationMode::Restrict, &CancellationToken::new())
            .await;
        assert_eq!(summary.success, 1);
        let restricted = service.storage().bucket("media").unwrap().policy.unwrap();
        assert_eq!(
            sids(&restricted),
            vec![Some(GUARD_SID.to_string()), Some("Allow1".to_string())]
        );

        service.unrestrict_bucket("media").await.unwrap();
        let restored = service.storage().bucket("media").unwrap().policy.unwrap();
        assert_eq!(
            PolicyDocument::parse(&restored).unwrap(),
            PolicyDocument::parse(ALLOW_POLICY).unwrap()
        );
    }

    #[tokio::test]
    async fn test_restrict_twice_keeps_one_guard() {
        let storage = MockStorage::new()
            .with_bucket("media", MockBucket::default().with_policy(ALLOW_POLICY));
        let service = service(storage);

        service.restrict_bucket("media").await.unwrap();
        let change = service.restrict_bucket("media").await.unwrap();

        assert_eq!(change, crate::policy::GuardChange::Replaced);
        let policy = service.storage().bucket("media").unwrap().policy.unwrap();
        assert_eq!(PolicyDocument::parse(&policy).unwrap().guard_count(), 1);
    }

    #[tokio::test]
    async fn test_restrict_without_policy_creates_one() {
        let storage = MockStorage::new().with_bucket("fresh", MockBucket::default());
        let service = service(storage);

        service.restrict_bucket("fresh").await.unwrap();

        let policy = service.storage().bucket("fresh").unwrap().policy.unwrap();
        let doc = PolicyDocument::parse(&policy).unwrap();
        assert_eq!(doc.version.as_deref(), Some("2012-10-17"));
        assert_eq!(doc.statement.len(), 1);
        assert!(doc.has_guard());
    }

    #[tokio::test]
    async fn test_unrestrict_only_guard_deletes_policy() {
        let storage = MockStorage::new().with_bucket("fresh", MockBucket::default());
        let service = service(storage);

        service.restrict_bucket("fresh").await.unwrap();
        service.unrestrict_bucket("fresh").await.unwrap();

        assert_eq!(service.storage().bucket("fresh").unwrap().policy, None);
        assert!(service
            .storage()
            .calls_for("fresh")
            .contains(&"DeleteBucketPolicy"));
    }

    #[tokio::test]
    async fn test_unrestrict_without_guard_fails() {
        let storage = MockStorage::new()
            .with_bucket("media", MockBucket::default().with_policy(ALLOW_POLICY));
        let service = service(storage);
        let targets = vec![RemediationTarget::new("media", TargetAction::Unrestrict)];

        let summary = service
            .remediate(&targets, RemediationMode::Unrestrict, &CancellationToken::new())
            .await;

        assert_eq!(summary.failed, 1);
        assert!(matches!(
            &summary.outcomes[0].outcome,
            Outcome::Failed(reason) if reason.contains("No 'RestrictGetObject' statement")
        ));
        // Nothing was written back
        assert!(!service
            .storage()
            .calls_for("media")
            .contains(&"PutBucketPolicy"));
    }

    #[tokio::test]
    async fn test_concurrent_overwrite_is_detected() {
        let storage = MockStorage::new()
            .with_bucket("media", MockBucket::default().with_policy(ALLOW_POLICY));
        storage.overwrite_policy_after_put("media", ALLOW_POLICY);
        let service = service(storage);

        let err = service.restrict_bucket("media").await.unwrap_err();
        assert!(err.to_string().contains("modified concurrently"));
    }

    #[tokio::test]
    async fn test_malformed_policy_fails_bucket_only() {
        let storage = MockStorage::new()
            .with_bucket("bad", MockBucket::default().with_policy("{not json"))
            .with_bucket("good", MockBucket::default());
        let service = service(storage);
        let targets = vec![
            RemediationTarget::new("bad", TargetAction::Restrict),
            RemediationTarget::new("good", TargetAction::Restrict),
        ];

        let summary = service
            .remediate(&targets, RemediationMode::Restrict, &CancellationToken::new())
            .await;
        assert_eq!((summary.success, summary.failed), (1, 1));
        assert!(matches!(
            &summary.outcomes[0].outcome,
            Outcome::Failed(reason) if reason.contains("Malformed policy document")
        ));
        assert_eq!(
            service.storage().bucket("bad").unwrap().policy.as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn test_restrict_can_block_public_access() {
        let storage = MockStorage::new().with_bucket("media", MockBucket::default());
        let config = GuardConfig {
            block_public_access_on_restrict: true,
            ..GuardConfig::default()
        };
        let service = ExposureGuardService::with_client(storage, config);

        service.restrict_bucket("media").await.unwrap();
        assert_eq!(
            service.storage().bucket("media").unwrap().access_block,
            Some(AccessBlockConfiguration::fully_blocked())
        );
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket() {
        let bucket = MockBucket::default()
            .with_object("a", vec![])
            .with_object("b", vec![])
            .with_object("c", vec![]);

        let storage = MockStorage::new().with_bucket("old", bucket.clone());
        let service = service(storage);
        let err = service.delete_bucket("old").await.unwrap_err();
        assert!(err.to_string().contains("BucketNotEmpty"));

        let storage = MockStorage::new().with_bucket("old", bucket);
        let config = GuardConfig {
            purge_objects_on_delete: true,
            ..GuardConfig::default()
        };
        let service = ExposureGuardService::with_client(storage, config);
        service.delete_bucket("old").await.unwrap();
        assert!(!service.storage().exists("old"));
    }

    #[tokio::test]
    async fn test_transient_error_fails_bucket_and_batch_continues() {
        let storage = MockStorage::new()
            .with_bucket("flaky", MockBucket::default())
            .with_bucket("ok", MockBucket::default());
        storage.fail(
            "DeleteBucket",
            "flaky",
            AwsError::from_service_code("DeleteBucket", "flaky", "ServiceUnavailable", "retry"),
        );
        let service = service(storage);
        let targets = vec![
            RemediationTarget::new("flaky", TargetAction::Delete),
            RemediationTarget::new("ok", TargetAction::Delete),
        ];

        let summary = service
            .remediate(&targets, RemediationMode::Delete, &CancellationToken::new())
            .await;
        assert_eq!((summary.success, summary.failed), (1, 1));
        assert!(service.storage().exists("flaky"));
        assert!(!service.storage().exists("ok"));
    }

    #[tokio::test]
    async fn test_probe_access_denied_is_unreachable() {
        let storage = MockStorage::new().with_bucket("other", MockBucket::default());
        storage.fail(
            "HeadBucket",
            "other",
            AwsError::from_service_code("HeadBucket", "other", codes::ACCESS_DENIED, ""),
        );
        let service = service(storage);
        let targets = vec![RemediationTarget::new("other", TargetAction::Restrict)];

        let summary = service
            .remediate(&targets, RemediationMode::Restrict, &CancellationToken::new())
            .await;
        assert_eq!(summary.failed, 1);
        assert_eq!(service.storage().calls_for("other"), vec!["HeadBucket"]);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_remaining_targets() {
        let storage = MockStorage::new().with_bucket("b", MockBucket::default());
        let service = service(storage);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let targets = vec![
            RemediationTarget::new("a", TargetAction::Keep),
            RemediationTarget::new("b", TargetAction::Delete),
        ];

        let summary = service
            .remediate(&targets, RemediationMode::Delete, &cancel)
            .await;
        assert_eq!(summary.skipped, 2);
        assert_eq!(
            summary.outcomes[1].outcome,
            Outcome::Skipped(SkipReason::Cancelled)
        );
        assert!(service.storage().exists("b"));
        assert!(service.storage().calls().is_empty());
    }
}
