//! Runtime configuration shared by the audit and remediation commands.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BUCKET_CONCURRENCY: usize = 4;
pub const DEFAULT_OBJECT_CONCURRENCY: usize = 8;
pub const DEFAULT_PARTITION: &str = "aws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Region override; the provider chain decides when unset
    pub region: Option<String>,
    /// Named credentials profile
    pub profile: Option<String>,
    /// Custom S3 endpoint (S3-compatible stores, local emulators); forces path-style addressing
    pub endpoint_url: Option<String>,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    /// Buckets processed at once
    pub bucket_concurrency: usize,
    /// Object ACL reads in flight per bucket
    pub object_concurrency: usize,
    /// ARN partition used in the guard statement resource
    pub partition: String,
    pub scan_objects: bool,
    pub purge_objects_on_delete: bool,
    pub block_public_access_on_restrict: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            endpoint_url: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            bucket_concurrency: DEFAULT_BUCKET_CONCURRENCY,
            object_concurrency: DEFAULT_OBJECT_CONCURRENCY,
            partition: DEFAULT_PARTITION.to_string(),
            scan_objects: true,
            purge_objects_on_delete: false,
            block_public_access_on_restrict: false,
        }
    }
}

impl GuardConfig {
    /// Reject settings that would stall or misaddress every request.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max attempts must be at least 1".to_string());
        }
        if self.bucket_concurrency == 0 || self.object_concurrency == 0 {
            return Err("concurrency limits must be at least 1".to_string());
        }
        if self.partition.trim().is_empty() {
            return Err("partition must not be empty".to_string());
        }
        Ok(())
    }
}
