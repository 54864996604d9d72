//! This crate provides the core business logic for S3 Exposure Guard:
//! - Public-exposure classification of buckets (policy status, bucket and object ACLs)
//! - Sid-keyed insertion and removal of the `RestrictGetObject` guard statement
//! - Batch remediation (delete, restrict, unrestrict) driven by a reviewed target list
//!

pub mod aws;
pub mod commands;
pub mod config;
mod error;
pub mod exposure;
pub mod policy;
pub mod targets;
mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-exports for a small, focused public API
pub use aws::{AwsError, AwsS3Client, StorageClient};
pub use commands::{plan_remediation, AuditScope, ExposureGuardService};
pub use config::GuardConfig;
pub use error::{ExposureGuardError, ExposureGuardResult};
pub use targets::{load_target_list, parse_target_list};
pub use types::{
    AccessBlockConfiguration, AccessBlockState, AuditSummary, BucketFailure, BucketOutcome,
    ExposureReport, Grant, GrantSource, Grantee, ObjectScanError, Outcome, Permission,
    PlannedAction, PublicGrant, RemediationMode, RemediationSummary, RemediationTarget,
    ScanCoverage, SkipReason, TargetAction, Verdict, ALL_USERS_URI, AUTHENTICATED_USERS_URI,
};
