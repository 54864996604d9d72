//! In-memory [`StorageClient`] for unit and integration tests.
//!
//! Every call is appended to a call log so tests can assert which buckets were
//! touched. Policy status is whatever the test sets; it is not derived from the policy.

use crate::aws::{codes, AwsError, AwsResult, ObjectPage, StorageClient};
use crate::types::{AccessBlockConfiguration, Grant};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Keys returned per `list_objects_page` call, small so pagination is exercised.
pub const MOCK_PAGE_SIZE: usize = 2;

#[derive(Debug, Clone, Default)]
pub struct MockBucket {
    pub access_block: Option<AccessBlockConfiguration>,
    pub policy_is_public: Option<bool>,
    pub acl: Vec<Grant>,
    pub objects: BTreeMap<String, Vec<Grant>>,
    pub policy: Option<String>,
}

impl MockBucket {
    pub fn with_object(mut self, key: &str, grants: Vec<Grant>) -> Self {
        self.objects.insert(key.to_string(), grants);
        self
    }

    pub fn with_policy(mut self, policy: &str) -> Self {
        self.policy = Some(policy.to_string());
        self
    }

    pub fn with_acl(mut self, grants: Vec<Grant>) -> Self {
        self.acl = grants;
        self
    }

    pub fn with_policy_status(mut self, is_public: bool) -> Self {
        self.policy_is_public = Some(is_public);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    pub bucket: String,
}

#[derive(Debug, Default)]
pub struct MockStorage {
    buckets: Mutex<BTreeMap<String, MockBucket>>,
    calls: Mutex<Vec<MockCall>>,
    failures: Mutex<HashMap<(&'static str, String), AwsError>>,
    /// Policy written behind our back after each `PutBucketPolicy`
    policy_overwrites: Mutex<HashMap<String, String>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, name: &str, bucket: MockBucket) -> Self {
        self.insert_bucket(name, bucket);
        self
    }

    pub fn insert_bucket(&self, name: &str, bucket: MockBucket) {
        lock(&self.buckets).insert(name.to_string(), bucket);
    }

    /// Make `operation` on `bucket` fail with `error` on every call.
    pub fn fail(&self, operation: &'static str, bucket: &str, error: AwsError) {
        lock(&self.failures).insert((operation, bucket.to_string()), error);
    }

    /// Simulate a concurrent writer replacing the policy right after our put.
    pub fn overwrite_policy_after_put(&self, bucket: &str, policy: &str) {
        lock(&self.policy_overwrites).insert(bucket.to_string(), policy.to_string());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, bucket: &str) -> Vec<&'static str> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.bucket == bucket)
            .map(|c| c.operation)
            .collect()
    }

    pub fn bucket(&self, name: &str) -> Option<MockBucket> {
        lock(&self.buckets).get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        lock(&self.buckets).contains_key(name)
    }

    fn record(&self, operation: &'static str, bucket: &str) -> AwsResult<()> {
        lock(&self.calls).push(MockCall {
            operation,
            bucket: bucket.to_string(),
        });
        match lock(&self.failures).get(&(operation, bucket.to_string())) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn with_existing<T>(
        &self,
        operation: &'static str,
        bucket: &str,
        f: impl FnOnce(&mut MockBucket) -> AwsResult<T>,
    ) -> AwsResult<T> {
        self.record(operation, bucket)?;
        let mut buckets = lock(&self.buckets);
        match buckets.get_mut(bucket) {
            Some(state) => f(state),
            None => Err(missing(operation, bucket)),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn missing(operation: &'static str, bucket: &str) -> AwsError {
    let code = if operation == "HeadBucket" {
        codes::NOT_FOUND
    } else {
        codes::NO_SUCH_BUCKET
    };
    AwsError::from_service_code(operation, bucket, code, "The specified bucket does not exist")
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn list_buckets(&self) -> AwsResult<Vec<String>> {
        self.record("ListBuckets", "*")?;
        Ok(lock(&self.buckets).keys().cloned().collect())
    }

    async fn get_public_access_block(
        &self,
        bucket: &str,
    ) -> AwsResult<Option<AccessBlockConfiguration>> {
        self.with_existing("GetPublicAccessBlock", bucket, |b| Ok(b.access_block))
    }

    async fn put_public_access_block(
        &self,
        bucket: &str,
        config: AccessBlockConfiguration,
    ) -> AwsResult<()> {
        self.with_existing("PutPublicAccessBlock", bucket, |b| {
            b.access_block = Some(config);
            Ok(())
        })
    }

    async fn get_policy_status(&self, bucket: &str) -> AwsResult<Option<bool>> {
        self.with_existing("GetBucketPolicyStatus", bucket, |b| Ok(b.policy_is_public))
    }

    async fn get_bucket_acl(&self, bucket: &str) -> AwsResult<Vec<Grant>> {
        self.with_existing("GetBucketAcl", bucket, |b| Ok(b.acl.clone()))
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> AwsResult<Vec<Grant>> {
        self.with_existing("GetObjectAcl", bucket, |b| {
            b.objects.get(key).cloned().ok_or_else(|| {
                AwsError::from_service_code("GetObjectAcl", bucket, "NoSuchKey", key)
            })
        })
    }

    async fn list_objects_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> AwsResult<ObjectPage> {
        // Tokens are the last key returned, so deleting listed keys between pages is safe
        self.with_existing("ListObjectsV2", bucket, |b| {
            let mut keys: Vec<String> = b
                .objects
                .keys()
                .filter(|k| {
                    continuation_token
                        .as_deref()
                        .map_or(true, |after| k.as_str() > after)
                })
                .take(MOCK_PAGE_SIZE + 1)
                .cloned()
                .collect();
            let next_token = if keys.len() > MOCK_PAGE_SIZE {
                keys.truncate(MOCK_PAGE_SIZE);
                keys.last().cloned()
            } else {
                None
            };
            Ok(ObjectPage { keys, next_token })
        })
    }

    async fn get_bucket_policy(&self, bucket: &str) -> AwsResult<Option<String>> {
        self.with_existing("GetBucketPolicy", bucket, |b| Ok(b.policy.clone()))
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> AwsResult<()> {
        let overwrite = lock(&self.policy_overwrites).get(bucket).cloned();
        self.with_existing("PutBucketPolicy", bucket, |b| {
            b.policy = Some(overwrite.unwrap_or_else(|| policy.to_string()));
            Ok(())
        })
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> AwsResult<()> {
        self.with_existing("DeleteBucketPolicy", bucket, |b| {
            b.policy = None;
            b.policy_is_public = None;
            Ok(())
        })
    }

    async fn head_bucket(&self, bucket: &str) -> AwsResult<()> {
        self.with_existing("HeadBucket", bucket, |_| Ok(()))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> AwsResult<()> {
        self.with_existing("DeleteObjects", bucket, |b| {
            for key in keys {
                b.objects.remove(key);
            }
            Ok(())
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> AwsResult<()> {
        self.record("DeleteBucket", bucket)?;
        let mut buckets = lock(&self.buckets);
        match buckets.get(bucket) {
            None => Err(missing("DeleteBucket", bucket)),
            Some(state) if !state.objects.is_empty() => Err(AwsError::from_service_code(
                "DeleteBucket",
                bucket,
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            )),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}
