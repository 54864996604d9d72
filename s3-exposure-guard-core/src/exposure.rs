//! Public-exposure classification
//!
//! A bucket is public when the service says its policy is public, or when any bucket
//! or object ACL grants a checked permission to one of the wildcard groups. The public
//! access block is reported next to the verdict but never changes it: it describes
//! what is prevented, not what is currently exposed.

use crate::types::{
    AccessBlockState, ExposureReport, Grant, GrantSource, ObjectScanError, Permission,
    PublicGrant, ScanCoverage, Verdict,
};

/// Permissions that make a wildcard grant public. `READ_ACP` is intentionally absent.
pub const CHECKED_PERMISSIONS: [Permission; 4] = [
    Permission::Read,
    Permission::Write,
    Permission::FullControl,
    Permission::WriteAcp,
];

pub fn is_grant_public(grant: &Grant) -> bool {
    grant.grantee.is_wildcard_group() && CHECKED_PERMISSIONS.contains(&grant.permission)
}

/// Accumulates the signals of one bucket as they are fetched.
#[derive(Debug, Clone)]
pub struct ExposureAssessment {
    bucket: String,
    access_block: AccessBlockState,
    policy_is_public: Option<bool>,
    public_grants: Vec<PublicGrant>,
    objects_scanned: u64,
    object_errors: Vec<ObjectScanError>,
}

impl ExposureAssessment {
    pub fn new(
        bucket: impl Into<String>,
        access_block: AccessBlockState,
        policy_is_public: Option<bool>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            access_block,
            policy_is_public,
            public_grants: Vec::new(),
            objects_scanned: 0,
            object_errors: Vec::new(),
        }
    }

    pub fn record_bucket_acl(&mut self, grants: &[Grant]) {
        self.public_grants.extend(
            grants
                .iter()
                .filter(|g| is_grant_public(g))
                .map(|g| PublicGrant {
                    source: GrantSource::BucketAcl,
                    grant: g.clone(),
                }),
        );
    }

    pub fn record_object_acl(&mut self, key: &str, grants: &[Grant]) {
        self.objects_scanned += 1;
        self.public_grants.extend(
            grants
                .iter()
                .filter(|g| is_grant_public(g))
                .map(|g| PublicGrant {
                    source: GrantSource::ObjectAcl {
                        key: key.to_string(),
                    },
                    grant: g.clone(),
                }),
        );
    }

    pub fn record_object_error(&mut self, key: &str, error: impl ToString) {
        self.objects_scanned += 1;
        self.object_errors.push(ObjectScanError {
            key: key.to_string(),
            error: error.to_string(),
        });
    }

    pub fn verdict(&self) -> Verdict {
        if self.policy_is_public == Some(true) || !self.public_grants.is_empty() {
            Verdict::Public
        } else {
            Verdict::Private
        }
    }

    pub fn finish(self, coverage: ScanCoverage) -> ExposureReport {
        let verdict = self.verdict();
        ExposureReport {
            bucket: self.bucket,
            verdict,
            policy_is_public: self.policy_is_public,
            access_block: self.access_block,
            public_grants: self.public_grants,
            objects_scanned: self.objects_scanned,
            object_errors: self.object_errors,
            scan_complete: coverage == ScanCoverage::Complete,
        }
    }
}
