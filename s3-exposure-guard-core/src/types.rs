//! Shared data model: grants, access-block state, exposure reports, remediation targets and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// URI of the global group that matches every requester, signed or not.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
/// URI of the global group that matches any signed request from any AWS account.
pub const AUTHENTICATED_USERS_URI: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// Principal an ACL grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grantee {
    AllUsers,
    AuthenticatedUsers,
    CanonicalUser(String),
    Email(String),
    /// Any other predefined group (e.g. the log delivery group)
    Group(String),
    Unknown,
}

impl Grantee {
    /// Map a group URI onto the well-known wildcard groups where possible.
    pub fn from_group_uri(uri: &str) -> Self {
        match uri {
            ALL_USERS_URI => Self::AllUsers,
            AUTHENTICATED_USERS_URI => Self::AuthenticatedUsers,
            other => Self::Group(other.to_string()),
        }
    }

    pub fn is_wildcard_group(&self) -> bool {
        matches!(self, Self::AllUsers | Self::AuthenticatedUsers)
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUsers => f.write_str(ALL_USERS_URI),
            Self::AuthenticatedUsers => f.write_str(AUTHENTICATED_USERS_URI),
            Self::CanonicalUser(id) => write!(f, "id={id}"),
            Self::Email(addr) => write!(f, "email={addr}"),
            Self::Group(uri) => f.write_str(uri),
            Self::Unknown => f.write_str("<unknown>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    FullControl,
    WriteAcp,
    ReadAcp,
    Unknown(String),
}

impl Permission {
    /// Parse the wire name (`READ`, `FULL_CONTROL`, ...).
    pub fn from_wire(value: &str) -> Self {
        match value {
            "READ" => Self::Read,
            "WRITE" => Self::Write,
            "FULL_CONTROL" => Self::FullControl,
            "WRITE_ACP" => Self::WriteAcp,
            "READ_ACP" => Self::ReadAcp,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::FullControl => "FULL_CONTROL",
            Self::WriteAcp => "WRITE_ACP",
            Self::ReadAcp => "READ_ACP",
            Self::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl Grant {
    pub fn new(grantee: Grantee, permission: Permission) -> Self {
        Self {
            grantee,
            permission,
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.grantee, self.permission.as_wire())
    }
}

/// Bucket-level public access block flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessBlockConfiguration {
    pub block_public_acls: bool,
    pub ignore_public_acls: bool,
    pub block_public_policy: bool,
    pub restrict_public_buckets: bool,
}

impl AccessBlockConfiguration {
    /// All four flags enabled.
    pub fn fully_blocked() -> Self {
        Self {
            block_public_acls: true,
            ignore_public_acls: true,
            block_public_policy: true,
            restrict_public_buckets: true,
        }
    }

    /// Flag name/value pairs in the order the service documents them.
    pub fn flags(&self) -> [(&'static str, bool); 4] {
        [
            ("BlockPublicAcls", self.block_public_acls),
            ("IgnorePublicAcls", self.ignore_public_acls),
            ("BlockPublicPolicy", self.block_public_policy),
            ("RestrictPublicBuckets", self.restrict_public_buckets),
        ]
    }
}

/// Whether the bucket carries a public access block configuration at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "flags")]
pub enum AccessBlockState {
    Configured(AccessBlockConfiguration),
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Public,
    Private,
}

/// Where a public grant was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source")]
pub enum GrantSource {
    BucketAcl,
    ObjectAcl { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicGrant {
    pub source: GrantSource,
    pub grant: Grant,
}

/// Object whose ACL could not be read during the object scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectScanError {
    pub key: String,
    pub error: String,
}

/// Classification result for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureReport {
    pub bucket: String,
    pub verdict: Verdict,
    /// `None` when the bucket has no policy to evaluate
    pub policy_is_public: Option<bool>,
    pub access_block: AccessBlockState,
    pub public_grants: Vec<PublicGrant>,
    pub objects_scanned: u64,
    pub object_errors: Vec<ObjectScanError>,
    /// False when the object scan was skipped or interrupted
    pub scan_complete: bool,
}

/// What a bucket scan covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCoverage {
    Complete,
    Interrupted,
    ObjectsSkipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketFailure {
    pub bucket: String,
    pub reason: String,
}

/// Result of an audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub run_id: String,
    pub account_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub reports: Vec<ExposureReport>,
    pub failures: Vec<BucketFailure>,
    pub public_buckets: BTreeSet<String>,
    /// Buckets never started because the run was cancelled
    pub not_audited: Vec<String>,
    pub cancelled: bool,
}

impl AuditSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Reviewer decision for one bucket in the target list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetAction {
    Keep,
    Delete,
    Restrict,
    Unrestrict,
}

impl TargetAction {
    /// Case-insensitive parse of the wire spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "KEEP" => Some(Self::Keep),
            "DELETE" => Some(Self::Delete),
            "RESTRICT" => Some(Self::Restrict),
            "UNRESTRICT" => Some(Self::Unrestrict),
            _ => None,
        }
    }
}

impl fmt::Display for TargetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Keep => "KEEP",
            Self::Delete => "DELETE",
            Self::Restrict => "RESTRICT",
            Self::Unrestrict => "UNRESTRICT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemediationTarget {
    pub bucket: String,
    pub action: TargetAction,
}

impl RemediationTarget {
    pub fn new(bucket: impl Into<String>, action: TargetAction) -> Self {
        Self {
            bucket: bucket.into(),
            action,
        }
    }
}

/// Which remediation a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationMode {
    Delete,
    Restrict,
    Unrestrict,
}

impl RemediationMode {
    /// The target action a bucket must carry to be acted on in this mode.
    pub fn required_action(self) -> TargetAction {
        match self {
            Self::Delete => TargetAction::Delete,
            Self::Restrict => TargetAction::Restrict,
            Self::Unrestrict => TargetAction::Unrestrict,
        }
    }

    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    KeepListed,
    ActionMismatch,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PlannedAction {
    Execute {
        bucket: String,
        mode: RemediationMode,
    },
    Skip {
        bucket: String,
        action: TargetAction,
        reason: SkipReason,
    },
}

impl PlannedAction {
    pub fn bucket(&self) -> &str {
        match self {
            Self::Execute { bucket, .. } | Self::Skip { bucket, .. } => bucket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail")]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOutcome {
    pub bucket: String,
    pub outcome: Outcome,
}

/// Result of a remediation run, outcomes in target order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationSummary {
    pub run_id: String,
    pub account_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<BucketOutcome>,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RemediationSummary {
    pub fn from_outcomes(
        run_id: String,
        account_id: Option<String>,
        outcomes: Vec<BucketOutcome>,
    ) -> Self {
        let mut summary = Self {
            run_id,
            account_id,
            ..Self::default()
        };
        for entry in &outcomes {
            match entry.outcome {
                Outcome::Success => summary.success += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
