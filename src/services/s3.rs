//! S3-compatible object store client (AWS S3, MinIO, R2, ...).
//!
//! Connection parameters come from each `file` field's bucket settings, so a
//! client is built per endpoint and credential pair. Path-style addressing is
//! always used.

use crate::{
    errors::{StorageError, StorageResult},
    models::field::BucketSettings,
    services::object_store::{ObjectPage, ObjectStore, ObjectStoreFactory},
};
use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::{
    Client,
    config::{Credentials, SharedCredentialsProvider},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    types::{Delete, ObjectIdentifier},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    endpoint: String,
}

impl S3ObjectStore {
    pub fn new(settings: &BucketSettings) -> Self {
        let credentials = Credentials::new(
            settings.key.clone(),
            settings.secret.clone(),
            None,
            None,
            "field-settings",
        );
        let config = aws_sdk_s3::Config::builder()
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .endpoint_url(&settings.endpoint)
            .force_path_style(true)
            .build();

        debug!(endpoint = %settings.endpoint, "S3 client initialized");

        Self {
            client: Client::from_conf(config),
            endpoint: settings.endpoint.clone(),
        }
    }

    fn label(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| StorageError::remote(self.label(bucket), DisplayErrorContext(e)))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        let next_continuation_token =
            next_page_token(output.is_truncated(), output.next_continuation_token());

        Ok(ObjectPage {
            keys,
            next_continuation_token,
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::invalid(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| StorageError::invalid(e.to_string()))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| StorageError::remote(self.label(bucket), DisplayErrorContext(e)))?;

        for error in output.errors() {
            warn!(
                bucket = %self.label(bucket),
                key = ?error.key(),
                code = ?error.code(),
                message = ?error.message(),
                "object could not be deleted"
            );
        }

        Ok(output.deleted().len())
    }

    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String> {
        let presign_config =
            PresigningConfig::expires_in(ttl).map_err(|e| StorageError::invalid(e.to_string()))?;

        let presigned = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::remote(self.label(bucket), DisplayErrorContext(e)))?;

        Ok(presigned.uri().to_string())
    }
}

/// Default factory: one fresh S3 client per bucket settings.
#[derive(Clone, Debug, Default)]
pub struct S3StoreFactory;

impl ObjectStoreFactory for S3StoreFactory {
    fn connect(&self, settings: &BucketSettings) -> StorageResult<Arc<dyn ObjectStore>> {
        Ok(Arc::new(S3ObjectStore::new(settings)))
    }
}

/// Some S3-compatible servers omit `IsTruncated`; a continuation token alone
/// then means there is another page. An explicit `false` always ends paging.
fn next_page_token(is_truncated: Option<bool>, token: Option<&str>) -> Option<String> {
    if is_truncated == Some(false) {
        return None;
    }
    token.filter(|t| !t.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_without_truncation_flag_continues_paging() {
        assert_eq!(next_page_token(None, Some("k100")).as_deref(), Some("k100"));
        assert_eq!(next_page_token(Some(true), Some("k100")).as_deref(), Some("k100"));
    }

    #[test]
    fn paging_stops_on_last_page() {
        assert_eq!(next_page_token(Some(false), Some("k100")), None);
        assert_eq!(next_page_token(None, None), None);
        assert_eq!(next_page_token(Some(true), Some("")), None);
    }
}
