//! Error types for S3 Exposure Guard operations.

use crate::aws::AwsError;
use crate::policy::GUARD_SID;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExposureGuardError {
    /// The run cannot start at all (no client, invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid target list: {0}")]
    TargetList(String),

    #[error("Bucket '{bucket}' is unreachable: {source}")]
    BucketUnreachable {
        bucket: String,
        #[source]
        source: AwsError,
    },

    #[error("No '{}' statement present in the policy of bucket '{bucket}'", GUARD_SID)]
    NoGuardPresent { bucket: String },

    #[error("Malformed policy document for bucket '{bucket}': {reason}")]
    MalformedPolicyDocument {
        bucket: String,
        reason: String,
        /// Raw document as returned by the service
        document: String,
    },

    /// The confirming read did not show the write we made.
    #[error("Policy of bucket '{bucket}' was modified concurrently: {detail}")]
    ConcurrentModification { bucket: String, detail: String },

    #[error(transparent)]
    Aws(#[from] AwsError),
}

impl ExposureGuardError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn target_list(msg: impl Into<String>) -> Self {
        Self::TargetList(msg.into())
    }

    /// Errors that end the whole run rather than a single bucket.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::TargetList(_))
    }
}

pub type ExposureGuardResult<T> = Result<T, ExposureGuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_guard_message_names_sid() {
        let err = ExposureGuardError::NoGuardPresent {
            bucket: "logs".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No 'RestrictGetObject' statement present in the policy of bucket 'logs'"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ExposureGuardError::configuration("no region").is_fatal());
        assert!(ExposureGuardError::target_list("bad row").is_fatal());
        assert!(!ExposureGuardError::ConcurrentModification {
            bucket: "logs".to_string(),
            detail: "guard missing after write".to_string(),
        }
        .is_fatal());
    }
}
