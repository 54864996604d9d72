//! AWS S3 client wrapper implementing [`StorageClient`]
//!
//! Retry, backoff and connect timeouts come from the SDK config this client is
//! built from; nothing here retries on its own.

use crate::aws::{codes, AwsError, AwsResult, ObjectPage, StorageClient};
use crate::types::{AccessBlockConfiguration, Grant, Grantee, Permission};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{Delete, ObjectIdentifier, PublicAccessBlockConfiguration};
use aws_sdk_s3::Client as S3Client;

#[derive(Clone, Debug)]
pub struct AwsS3Client {
    client: S3Client,
}

impl AwsS3Client {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

/// Translate an SDK failure into the crate's error taxonomy.
fn sdk_error<E>(operation: &'static str, bucket: &str, err: SdkError<E, HttpResponse>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let code = match service.err().code() {
                Some(code) => code.to_string(),
                None if status == 404 => codes::NOT_FOUND.to_string(),
                None if status == 403 => codes::ACCESS_DENIED.to_string(),
                None if status >= 500 => "ServiceUnavailable".to_string(),
                None => format!("HTTP{status}"),
            };
            let detail = service.err().message().unwrap_or(message.as_str()).to_string();
            AwsError::from_service_code(operation, bucket, &code, detail)
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            AwsError::Transient {
                operation,
                bucket: bucket.to_string(),
                message,
            }
        }
        _ => AwsError::Request { operation, message },
    }
}

fn convert_grantee(grantee: &aws_sdk_s3::types::Grantee) -> Grantee {
    if let Some(uri) = grantee.uri() {
        Grantee::from_group_uri(uri)
    } else if let Some(id) = grantee.id() {
        Grantee::CanonicalUser(id.to_string())
    } else if let Some(email) = grantee.email_address() {
        Grantee::Email(email.to_string())
    } else {
        Grantee::Unknown
    }
}

fn convert_grants(grants: &[aws_sdk_s3::types::Grant]) -> Vec<Grant> {
    grants
        .iter()
        .map(|grant| {
            let grantee = grant
                .grantee()
                .map(convert_grantee)
                .unwrap_or(Grantee::Unknown);
            let permission = grant
                .permission()
                .map(|p| Permission::from_wire(p.as_str()))
                .unwrap_or_else(|| Permission::Unknown(String::new()));
            Grant::new(grantee, permission)
        })
        .collect()
}

#[async_trait]
impl StorageClient for AwsS3Client {
    async fn list_buckets(&self) -> AwsResult<Vec<String>> {
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let response = self
                .client
                .list_buckets()
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListBuckets", "*", e))?;

            names.extend(
                response
                    .buckets()
                    .iter()
                    .filter_map(|b| b.name().map(ToOwned::to_owned)),
            );

            match response.continuation_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> AwsResult<Option<AccessBlockConfiguration>> {
        let result = self
            .client
            .get_public_access_block()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetPublicAccessBlock", bucket, e));

        match result {
            Ok(response) => Ok(response.public_access_block_configuration().map(|c| {
                AccessBlockConfiguration {
                    block_public_acls: c.block_public_acls().unwrap_or(false),
                    ignore_public_acls: c.ignore_public_acls().unwrap_or(false),
                    block_public_policy: c.block_public_policy().unwrap_or(false),
                    restrict_public_buckets: c.restrict_public_buckets().unwrap_or(false),
                }
            })),
            Err(e) if e.has_code(codes::NO_SUCH_PUBLIC_ACCESS_BLOCK) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        config: AccessBlockConfiguration,
    ) -> AwsResult<()> {
        let configuration = PublicAccessBlockConfiguration::builder()
            .block_public_acls(config.block_public_acls)
            .ignore_public_acls(config.ignore_public_acls)
            .block_public_policy(config.block_public_policy)
            .restrict_public_buckets(config.restrict_public_buckets)
            .build();

        self.client
            .put_public_access_block()
            .bucket(bucket)
            .public_access_block_configuration(configuration)
            .send()
            .await
            .map_err(|e| sdk_error("PutPublicAccessBlock", bucket, e))?;
        Ok(())
    }

    async fn get_policy_status(&self, bucket: &str) -> AwsResult<Option<bool>> {
        let result = self
            .client
            .get_bucket_policy_status()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketPolicyStatus", bucket, e));

        match result {
            Ok(response) => Ok(Some(
                response
                    .policy_status()
                    .and_then(|status| status.is_public())
                    .unwrap_or(false),
            )),
            Err(e) if e.has_code(codes::NO_SUCH_BUCKET_POLICY) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_bucket_acl(&self, bucket: &str) -> AwsResult<Vec<Grant>> {
        let response = self
            .client
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketAcl", bucket, e))?;
        Ok(convert_grants(response.grants()))
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> AwsResult<Vec<Grant>> {
        let response = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("GetObjectAcl", bucket, e))?;
        Ok(convert_grants(response.grants()))
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> AwsResult<ObjectPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| sdk_error("ListObjectsV2", bucket, e))?;

        let keys = response
            .contents()
            .iter()
            .filter_map(|object| object.key().map(ToOwned::to_owned))
            .collect();
        let next_token = if response.is_truncated() == Some(true) {
            response.next_continuation_token().map(ToOwned::to_owned)
        } else {
            None
        };
        Ok(ObjectPage { keys, next_token })
    }

    async fn get_bucket_policy(&self, bucket: &str) -> AwsResult<Option<String>> {
        let result = self
            .client
            .get_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("GetBucketPolicy", bucket, e));

        match result {
            Ok(response) => Ok(response.policy().map(ToOwned::to_owned)),
            Err(e) if e.has_code(codes::NO_SUCH_BUCKET_POLICY) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AwsResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| sdk_error("PutBucketPolicy", bucket, e))?;
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> AwsResult<()> {
        self.client
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteBucketPolicy", bucket, e))?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> AwsResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("HeadBucket", bucket, e))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> AwsResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AwsError::Request {
                operation: "DeleteObjects",
                message: e.to_string(),
            })?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| AwsError::Request {
                operation: "DeleteObjects",
                message: e.to_string(),
            })?;

        let response = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteObjects", bucket, e))?;

        // Quiet mode only reports the keys that failed
        if let Some(first) = response.errors().first() {
            return Err(AwsError::from_service_code(
                "DeleteObjects",
                bucket,
                first.code().unwrap_or("Unknown"),
                format!(
                    "{} of {} keys not deleted, first '{}': {}",
                    response.errors().len(),
                    keys.len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                ),
            ));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> AwsResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error("DeleteBucket", bucket, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ALL_USERS_URI, AUTHENTICATED_USERS_URI};
    use aws_sdk_s3::types::{Permission as SdkPermission, Type};

    fn sdk_grant(
        grantee: aws_sdk_s3::types::Grantee,
        permission: SdkPermission,
    ) -> aws_sdk_s3::types::Grant {
        aws_sdk_s3::types::Grant::builder()
            .grantee(grantee)
            .permission(permission)
            .build()
    }

    #[test]
    fn test_convert_group_and_user_grants() {
        let grants = vec![
            sdk_grant(
                aws_sdk_s3::types::Grantee::builder()
                    .r#type(Type::Group)
                    .uri(ALL_USERS_URI)
                    .build()
                    .unwrap(),
                SdkPermission::Read,
            ),
            sdk_grant(
                aws_sdk_s3::types::Grantee::builder()
                    .r#type(Type::Group)
                    .uri(AUTHENTICATED_USERS_URI)
                    .build()
                    .unwrap(),
                SdkPermission::WriteAcp,
            ),
            sdk_grant(
                aws_sdk_s3::types::Grantee::builder()
                    .r#type(Type::CanonicalUser)
                    .id("owner-id")
                    .build()
                    .unwrap(),
                SdkPermission::FullControl,
            ),
        ];

        let converted = convert_grants(&grants);
        assert_eq!(
            converted,
            vec![
                Grant::new(Grantee::AllUsers, Permission::Read),
                Grant::new(Grantee::AuthenticatedUsers, Permission::WriteAcp),
                Grant::new(
                    Grantee::CanonicalUser("owner-id".to_string()),
                    Permission::FullControl
                ),
            ]
        );
    }

    #[test]
    fn test_convert_grant_without_grantee() {
        let grant = aws_sdk_s3::types::Grant::builder()
            .permission(SdkPermission::ReadAcp)
            .build();
        let converted = convert_grants(&[grant]);
        assert_eq!(
            converted,
            vec![Grant::new(Grantee::Unknown, Permission::ReadAcp)]
        );
    }
}
