//! Caller identity lookup, used to stamp reports with the audited account.

use crate::aws::{AwsError, AwsResult};
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client as StsClient;

pub(crate) async fn caller_account_id(client: &StsClient) -> AwsResult<String> {
    let response = client.get_caller_identity().send().await.map_err(|e| {
        AwsError::ConfigError(format!(
            "Failed to resolve caller identity: {}",
            DisplayErrorContext(&e)
        ))
    })?;

    response
        .account()
        .map(ToOwned::to_owned)
        .ok_or_else(|| AwsError::ConfigError("Caller identity has no account id".to_string()))
}
