//! Audit logic for the S3 Exposure Guard service

use crate::aws::{object_keys, StorageClient};
use crate::error::ExposureGuardResult;
use crate::exposure::ExposureAssessment;
use crate::types::{
    AccessBlockState, AuditSummary, BucketFailure, ExposureReport, Grant, RemediationTarget,
    ScanCoverage, TargetAction, Verdict,
};
use futures::{future, stream, StreamExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Which buckets an audit covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditScope {
    /// Every bucket the caller can list
    AllBuckets,
    /// The non-KEEP buckets of a reviewed target list
    Targets(Vec<RemediationTarget>),
}

impl<C: StorageClient> super::service::ExposureGuardService<C> {
    /// Classify every bucket in scope and reduce the reports into a summary.
    ///
    /// Per-bucket failures are collected, never propagated. The only run-level error
    /// is failing to list the buckets when the scope is the whole account. Buckets not
    /// started before cancellation are returned in `not_audited`.
    pub async fn audit(
        &self,
        scope: AuditScope,
        cancel: &CancellationToken,
    ) -> ExposureGuardResult<AuditSummary> {
        let run_id = Self::new_run_id();
        let started_at = chrono::Utc::now();
        let buckets = match scope {
            AuditScope::AllBuckets => self.storage.list_buckets().await?,
            AuditScope::Targets(targets) => targets
                .into_iter()
                .filter(|t| t.action != TargetAction::Keep)
                .map(|t| t.bucket)
                .collect(),
        };
        info!("Auditing {} buckets (run {})", buckets.len(), run_id);

        let results: Vec<(String, Option<ExposureGuardResult<ExposureReport>>)> =
            stream::iter(buckets)
                .map(|bucket| async move {
                    if cancel.is_cancelled() {
                        return (bucket, None);
                    }
                    let result = self.classify_bucket(&bucket, cancel).await;
                    (bucket, Some(result))
                })
                .buffered(self.config.bucket_concurrency)
                .collect()
                .await;

        let mut summary = AuditSummary {
            run_id,
            account_id: self.account_id.clone(),
            started_at: Some(started_at),
            cancelled: cancel.is_cancelled(),
            ..AuditSummary::default()
        };
        for (bucket, result) in results {
            match result {
                None => summary.not_audited.push(bucket),
                Some(Ok(report)) => {
                    if report.verdict == Verdict::Public {
                        summary.public_buckets.insert(report.bucket.clone());
                    }
                    summary.reports.push(report);
                }
                Some(Err(e)) => {
                    error!("Bucket: {}, operation: audit, error: {}", bucket, e);
                    summary.failures.push(BucketFailure {
                        bucket,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Audit finished: {} public, {} private, {} failed, {} not audited",
            summary.public_buckets.len(),
            summary.reports.len() - summary.public_buckets.len(),
            summary.failures.len(),
            summary.not_audited.len()
        );
        Ok(summary)
    }

    /// Fetch every exposure signal of one bucket and classify it.
    pub async fn classify_bucket(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> ExposureGuardResult<ExposureReport> {
        let access_block = match self.storage.get_public_access_block(bucket).await? {
            Some(config) => {
                for (flag, value) in config.flags() {
                    info!("Bucket: {}, {}: {}", bucket, flag, value);
                }
                AccessBlockState::Configured(config)
            }
            None => {
                info!("Bucket: {} has no Public Access Block Configuration", bucket);
                AccessBlockState::Absent
            }
        };

        let policy_is_public = self.storage.get_policy_status(bucket).await?;
        match policy_is_public {
            Some(is_public) => info!("Bucket: {}, policy is public: {}", bucket, is_public),
            None => info!("Bucket: {} has no bucket policy", bucket),
        }

        let mut assessment = ExposureAssessment::new(bucket, access_block, policy_is_public);
        let acl = self.storage.get_bucket_acl(bucket).await?;
        info!("Bucket: {}, ACL: [{}]", bucket, format_grants(&acl));
        assessment.record_bucket_acl(&acl);

        let coverage = if self.config.scan_objects {
            self.scan_objects(bucket, &mut assessment, cancel).await?
        } else {
            ScanCoverage::ObjectsSkipped
        };

        let report = assessment.finish(coverage);
        info!(
            "Bucket: {}, verdict: {:?}, public grants: {}, objects scanned: {}",
            bucket,
            report.verdict,
            report.public_grants.len(),
            report.objects_scanned
        );
        Ok(report)
    }

    /// Read each object's ACL over the lazy key stream.
    ///
    /// Cancellation stops new requests; the grants already recorded stay in the report.
    async fn scan_objects(
        &self,
        bucket: &str,
        assessment: &mut ExposureAssessment,
        cancel: &CancellationToken,
    ) -> ExposureGuardResult<ScanCoverage> {
        let storage = &self.storage;
        let interrupted = AtomicBool::new(false);

        let mut acls = Box::pin(
            object_keys(storage, bucket)
                .take_while(|_| {
                    let keep_going = !cancel.is_cancelled();
                    if !keep_going {
                        interrupted.store(true, Ordering::Relaxed);
                    }
                    future::ready(keep_going)
                })
                .map(|key| async move {
                    let key = key?;
                    let grants = storage.get_object_acl(bucket, &key).await;
                    Ok::<_, crate::aws::AwsError>((key, grants))
                })
                .buffered(self.config.object_concurrency),
        );

        while let Some(item) = acls.next().await {
            let (key, grants) = item?;
            match grants {
                Ok(grants) => {
                    debug!("Object: {}/{}, ACL: [{}]", bucket, key, format_grants(&grants));
                    assessment.record_object_acl(&key, &grants);
                }
                Err(e) => {
                    warn!("Object: {}/{}, ACL could not be read: {}", bucket, key, e);
                    assessment.record_object_error(&key, e);
                }
            }
        }

        if interrupted.load(Ordering::Relaxed) {
            warn!("Bucket: {}, object scan interrupted by cancellation", bucket);
            Ok(ScanCoverage::Interrupted)
        } else {
            Ok(ScanCoverage::Complete)
        }
    }
}

fn format_grants(grants: &[Grant]) -> String {
    grants
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
