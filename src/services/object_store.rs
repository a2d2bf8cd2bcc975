//! Narrow object-store interface the storage services depend on.

use crate::{
    errors::{StorageError, StorageResult},
    models::field::BucketSettings,
};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt, stream};
use std::{sync::Arc, time::Duration};

/// One page of a bucket listing.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Token for the following page; `None` on the last page.
    pub next_continuation_token: Option<String>,
}

/// Client bound to one endpoint and set of credentials.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys, starting after `continuation_token`.
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectPage>;

    /// Delete `keys` in one request and return how many were removed.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<usize>;

    /// A URL allowing a single PUT of `key` for `ttl`.
    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String>;
}

/// Builds clients from the bucket settings stored on `file` fields.
pub trait ObjectStoreFactory: Send + Sync {
    fn connect(&self, settings: &BucketSettings) -> StorageResult<Arc<dyn ObjectStore>>;
}

/// Stream every key of `bucket`, fetching one page at a time.
pub fn list_keys<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
) -> impl Stream<Item = StorageResult<String>> + Send + 'a {
    // `None` once the last page has been fetched.
    let start: Option<Option<String>> = Some(None);
    stream::try_unfold(start, move |state| async move {
        let Some(token) = state else {
            return Ok::<_, StorageError>(None);
        };
        let page = store.list_page(bucket, token).await?;
        let next = page.next_continuation_token.map(Some);
        let keys = stream::iter(page.keys.into_iter().map(Ok));
        Ok(Some((keys, next)))
    })
    .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct PagedStore {
        pages: Vec<Vec<&'static str>>,
        requested: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl ObjectStore for PagedStore {
        async fn list_page(
            &self,
            _bucket: &str,
            token: Option<String>,
        ) -> StorageResult<ObjectPage> {
            self.requested.lock().unwrap().push(token.clone());
            let index: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let next = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(ObjectPage {
                keys: self.pages[index].iter().map(|k| k.to_string()).collect(),
                next_continuation_token: next,
            })
        }

        async fn delete_objects(&self, _bucket: &str, keys: &[String]) -> StorageResult<usize> {
            Ok(keys.len())
        }

        async fn presign_put(&self, _: &str, key: &str, _: Duration) -> StorageResult<String> {
            Ok(key.to_string())
        }
    }

    #[tokio::test]
    async fn listing_follows_continuation_tokens() {
        let store = PagedStore {
            pages: vec![vec!["a/1", "a/2"], vec![], vec!["b/3"]],
            requested: Mutex::new(Vec::new()),
        };
        let keys: Vec<String> = list_keys(&store, "bucket").try_collect().await.unwrap();
        assert_eq!(keys, vec!["a/1", "a/2", "b/3"]);
        assert_eq!(
            *store.requested.lock().unwrap(),
            vec![None, Some("1".to_string()), Some("2".to_string())]
        );
    }
}
