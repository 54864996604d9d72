//! AWS SDK integration: the storage client seam, its S3 implementation, and STS caller lookup.

pub mod listing;
pub(crate) mod s3_client;
pub(crate) mod sts;

use crate::types::{AccessBlockConfiguration, Grant};
use async_trait::async_trait;
use thiserror::Error;

pub use listing::{object_keys, object_pages};
pub use s3_client::AwsS3Client;

/// Service error codes the core interprets instead of treating as failures.
pub mod codes {
    pub const NO_SUCH_PUBLIC_ACCESS_BLOCK: &str = "NoSuchPublicAccessBlockConfiguration";
    pub const NO_SUCH_BUCKET_POLICY: &str = "NoSuchBucketPolicy";
    pub const NO_SUCH_BUCKET: &str = "NoSuchBucket";
    /// `HeadBucket` has no body, so a missing bucket surfaces as a bare 404
    pub const NOT_FOUND: &str = "NotFound";
    pub const ACCESS_DENIED: &str = "AccessDenied";

    /// Codes the SDK retry policy treats as retryable; seen here only once retries are exhausted.
    pub const TRANSIENT: &[&str] = &[
        "SlowDown",
        "Throttling",
        "ThrottlingException",
        "RequestTimeout",
        "RequestTimeTooSkewed",
        "ServiceUnavailable",
        "InternalError",
    ];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AwsError {
    #[error("AWS configuration error: {0}")]
    ConfigError(String),
    #[error("{operation} on '{bucket}' failed after retries: {message}")]
    Transient {
        operation: &'static str,
        bucket: String,
        message: String,
    },
    #[error("{operation} on '{bucket}' failed with {code}: {message}")]
    Service {
        operation: &'static str,
        bucket: String,
        code: String,
        message: String,
    },
    #[error("failed to build {operation} request: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },
}

impl AwsError {
    /// Machine-readable service error code, if the service returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn has_code(&self, expected: &str) -> bool {
        self.code() == Some(expected)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// True when the error says the bucket does not exist.
    pub fn is_missing_bucket(&self) -> bool {
        self.has_code(codes::NO_SUCH_BUCKET) || self.has_code(codes::NOT_FOUND)
    }

    /// Build a service error, folding retry-exhausted codes into `Transient`.
    pub fn from_service_code(
        operation: &'static str,
        bucket: &str,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        if codes::TRANSIENT.contains(&code) {
            Self::Transient {
                operation,
                bucket: bucket.to_string(),
                message: format!("{code}: {}", message.into()),
            }
        } else {
            Self::Service {
                operation,
                bucket: bucket.to_string(),
                code: code.to_string(),
                message: message.into(),
            }
        }
    }
}

pub type AwsResult<T> = Result<T, AwsError>;

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Operations the auditor and remediator need from the storage service.
///
/// Implementations map "configuration absent" style service codes onto `None`
/// instead of errors; every other failure is an `AwsError`. Retry and timeout
/// policy belongs to the implementation, never to callers.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn list_buckets(&self) -> AwsResult<Vec<String>>;

    /// `None` when the bucket has no public access block configuration.
    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> AwsResult<Option<AccessBlockConfiguration>>;

    async fn put_public_access_block(
        &self,
        bucket: &str,
        config: AccessBlockConfiguration,
    ) -> AwsResult<()>;

    /// `None` when the bucket has no policy for the service to evaluate.
    async fn get_policy_status(&self, bucket: &str) -> AwsResult<Option<bool>>;

    async fn get_bucket_acl(&self, bucket: &str) -> AwsResult<Vec<Grant>>;

    async fn get_object_acl(&self, bucket: &str, key: &str) -> AwsResult<Vec<Grant>>;

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> AwsResult<ObjectPage>;

    /// Raw policy JSON, `None` when the bucket has no policy.
    async fn get_bucket_policy(&self, bucket: &str) -> AwsResult<Option<String>>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AwsResult<()>;

    async fn delete_bucket_policy(&self, bucket: &str) -> AwsResult<()>;

    /// Existence and reachability probe.
    async fn head_bucket(&self, bucket: &str) -> AwsResult<()>;

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> AwsResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> AwsResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttling_codes_fold_into_transient() {
        let err = AwsError::from_service_code("GetObjectAcl", "b", "SlowDown", "reduce rate");
        assert!(err.is_transient());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_service_codes_are_kept() {
        let err = AwsError::from_service_code(
            "GetBucketPolicy",
            "b",
            codes::NO_SUCH_BUCKET_POLICY,
            "The bucket policy does not exist",
        );
        assert!(err.has_code(codes::NO_SUCH_BUCKET_POLICY));
        assert!(!err.is_missing_bucket());
        assert!(err.to_string().contains("GetBucketPolicy on 'b'"));
    }

    #[test]
    fn test_missing_bucket_detection() {
        let head = AwsError::from_service_code("HeadBucket", "b", codes::NOT_FOUND, "");
        let get = AwsError::from_service_code("GetBucketAcl", "b", codes::NO_SUCH_BUCKET, "");
        assert!(head.is_missing_bucket());
        assert!(get.is_missing_bucket());
    }
}
