//! Lazy, paginated object listing over any [`StorageClient`].
//!
//! Pages are only requested as the consumer pulls, so dropping the stream stops the
//! listing and memory stays bounded by one page.

use crate::aws::{AwsResult, StorageClient};
use futures::stream::{self, Stream, TryStreamExt};

/// Stream of key pages; the first page is requested without a token.
pub fn object_pages<'a, C>(
    client: &'a C,
    bucket: &'a str,
) -> impl Stream<Item = AwsResult<Vec<String>>> + 'a
where
    C: StorageClient + ?Sized,
{
    // `Some(token)` = page still to fetch, `None` = listing exhausted
    stream::try_unfold(Some(None::<String>), move |state| async move {
        let Some(token) = state else {
            return Ok(None);
        };
        let page = client.list_objects_page(bucket, token).await?;
        let next_state = page.next_token.map(Some);
        Ok(Some((page.keys, next_state)))
    })
}

/// Stream of individual keys across all pages.
pub fn object_keys<'a, C>(
    client: &'a C,
    bucket: &'a str,
) -> impl Stream<Item = AwsResult<String>> + 'a
where
    C: StorageClient + ?Sized,
{
    object_pages(client, bucket)
        .map_ok(|keys| stream::iter(keys.into_iter().map(Ok)))
        .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBucket, MockStorage, MOCK_PAGE_SIZE};
    use futures::StreamExt;

    fn storage_with_objects(count: usize) -> MockStorage {
        let mut bucket = MockBucket::default();
        for i in 0..count {
            bucket = bucket.with_object(&format!("key-{i:03}"), Vec::new());
        }
        MockStorage::new().with_bucket("data", bucket)
    }

    #[tokio::test]
    async fn test_keys_span_pages_in_order() {
        let storage = storage_with_objects(5);
        let keys: Vec<String> = object_keys(&storage, "data").try_collect().await.unwrap();
        assert_eq!(
            keys,
            vec!["key-000", "key-001", "key-002", "key-003", "key-004"]
        );
        let listings = storage
            .calls_for("data")
            .into_iter()
            .filter(|op| *op == "ListObjectsV2")
            .count();
        assert_eq!(listings, 5_usize.div_ceil(MOCK_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_empty_bucket_yields_one_empty_page() {
        let storage = storage_with_objects(0);
        let pages: Vec<Vec<String>> = object_pages(&storage, "data").try_collect().await.unwrap();
        assert_eq!(pages, vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn test_listing_is_lazy() {
        let storage = storage_with_objects(10);
        let first: Vec<AwsResult<String>> = object_keys(&storage, "data").take(1).collect().await;
        assert_eq!(first.len(), 1);
        assert_eq!(storage.calls_for("data"), vec!["ListObjectsV2"]);
    }

    #[tokio::test]
    async fn test_missing_bucket_surfaces_error() {
        let storage = MockStorage::new();
        let result: AwsResult<Vec<String>> = object_keys(&storage, "ghost").try_collect().await;
        assert!(result.unwrap_err().is_missing_bucket());
    }
}
