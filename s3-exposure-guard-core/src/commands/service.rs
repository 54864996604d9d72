//! S3 Exposure Guard Service Layer
//!
//! The service owns the storage client and the run configuration and exposes the
//! high-level operations (audit, remediate) used by the CLI. The method bodies live in
//! `audit.rs` and `remediate.rs`.

use crate::aws::sts::caller_account_id;
use crate::aws::{AwsS3Client, StorageClient};
use crate::config::GuardConfig;
use crate::error::{ExposureGuardError, ExposureGuardResult};
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::Client as StsClient;
use log::{debug, info, warn};

/// Main service struct holding the storage client and run settings
pub struct ExposureGuardService<C = AwsS3Client> {
    pub(crate) storage: C,
    pub(crate) config: GuardConfig,
    pub(crate) account_id: Option<String>,
}

impl ExposureGuardService<AwsS3Client> {
    /// Create a service backed by the real S3 API.
    ///
    /// Credentials come from the default provider chain. Retry and connect-timeout
    /// policy is set on the SDK client, never by callers. The caller account is looked
    /// up once so every report can be stamped with it; failure there is only a warning.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the settings are invalid or no region can be
    /// resolved.
    pub async fn new(config: GuardConfig) -> ExposureGuardResult<Self> {
        config.validate().map_err(ExposureGuardError::configuration)?;

        let sdk_config = load_sdk_config(&config).await;
        let region = sdk_config.region().ok_or_else(|| {
            ExposureGuardError::configuration(
                "no AWS region configured (use --region, S3_GUARD_REGION or an AWS profile)",
            )
        })?;
        info!("Using region {}", region);

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint_url.is_some() {
            // Custom endpoints (LocalStack and friends) rarely serve virtual-hosted buckets
            s3_config = s3_config.force_path_style(true);
        }
        let storage = AwsS3Client::new(aws_sdk_s3::Client::from_conf(s3_config.build()));

        let account_id = match caller_account_id(&StsClient::new(&sdk_config)).await {
            Ok(account) => {
                info!("Running as account {}", account);
                Some(account)
            }
            Err(e) => {
                warn!("Could not resolve caller account, continuing without it: {}", e);
                None
            }
        };

        Ok(Self {
            storage,
            config,
            account_id,
        })
    }
}

impl<C: StorageClient> ExposureGuardService<C> {
    /// Create a service over an existing client, without an account lookup.
    pub fn with_client(storage: C, config: GuardConfig) -> Self {
        Self {
            storage,
            config,
            account_id: None,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn storage(&self) -> &C {
        &self.storage
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub(crate) fn new_run_id() -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        debug!("Starting run {}", run_id);
        run_id
    }

    // audit() method implementation is in audit.rs
    // remediate() method implementation is in remediate.rs
}

async fn load_sdk_config(config: &GuardConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts))
        .timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(config.connect_timeout)
                .build(),
        );

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &config.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}
