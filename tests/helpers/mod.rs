//! Shared fixtures: in-memory SQLite repository and a fake object store.

#![allow(dead_code)]

use async_trait::async_trait;
use field_storage::{
    errors::{StorageError, StorageResult},
    models::{
        field::{BucketSettings, FieldDefinition},
        fieldable::{Fieldable, FieldableKind},
    },
    services::{
        object_store::{ObjectPage, ObjectStore, ObjectStoreFactory},
        repository::{SchemaRepository, SqliteRepository},
        signer,
    },
};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SECRET: &str = "test-secret";
pub const ENDPOINT: &str = "http://minio:9000";

pub async fn test_repo() -> SqliteRepository {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let repo = SqliteRepository::new(Arc::new(pool));
    repo.migrate().await.expect("migrations");
    repo
}

pub fn bucket(name: &str) -> Value {
    json!({"endpoint": ENDPOINT, "bucket": name, "key": "access", "secret": "secret"})
}

pub fn file_field(identifier: &str, bucket_name: &str) -> FieldDefinition {
    serde_json::from_value(json!({
        "identifier": identifier,
        "title": identifier,
        "type": "file",
        "settings": {"bucket": bucket(bucket_name)}
    }))
    .unwrap()
}

pub fn collection_field(identifier: &str, nested: Vec<Value>) -> FieldDefinition {
    serde_json::from_value(json!({
        "identifier": identifier,
        "title": identifier,
        "type": "collection",
        "settings": {"fields": nested}
    }))
    .unwrap()
}

/// A stored file value with a valid checksum.
pub fn stored_file(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "size": 42, "checksum": signer::checksum(SECRET, id, name)})
}

/// Create a schema with `fields` and return it as loaded back from storage.
pub async fn schema(
    repo: &SqliteRepository,
    kind: FieldableKind,
    identifier: &str,
    fields: Vec<FieldDefinition>,
) -> Arc<Fieldable> {
    let id: Uuid = repo.create_fieldable(kind, identifier, identifier).await.unwrap();
    for field in &fields {
        repo.add_field(id, field).await.unwrap();
    }
    repo.find_fieldable(kind, identifier).await.unwrap().unwrap()
}

/// Fake S3: buckets of keys, paginated listing, recorded deletes.
pub struct FakeObjectStore {
    pub buckets: Mutex<BTreeMap<String, BTreeSet<String>>>,
    pub page_size: usize,
    pub delete_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub list_calls: Mutex<usize>,
    pub failing: HashSet<String>,
    /// 1-based `delete_objects` call that fails with a remote error.
    pub failing_delete_call: Option<usize>,
    /// Cancelled right after the first successful `delete_objects` call.
    pub cancel_on_delete: Option<CancellationToken>,
}

impl FakeObjectStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            page_size,
            delete_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(0),
            failing: HashSet::new(),
            failing_delete_call: None,
            cancel_on_delete: None,
        }
    }

    pub fn failing_delete_call(mut self, call: usize) -> Self {
        self.failing_delete_call = Some(call);
        self
    }

    pub fn cancel_on_delete(mut self, token: CancellationToken) -> Self {
        self.cancel_on_delete = Some(token);
        self
    }

    pub fn failing(mut self, bucket: &str) -> Self {
        self.failing.insert(bucket.to_string());
        self
    }

    pub fn put(&self, bucket: &str, keys: &[&str]) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .extend(keys.iter().map(|k| k.to_string()));
    }

    pub fn keys(&self, bucket: &str) -> BTreeSet<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default()
    }

    pub fn delete_calls(&self) -> Vec<(String, Vec<String>)> {
        self.delete_calls.lock().unwrap().clone()
    }

    fn check(&self, bucket: &str) -> StorageResult<()> {
        if self.failing.contains(bucket) {
            Err(StorageError::remote(bucket, "connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ObjectPage> {
        self.check(bucket)?;
        *self.list_calls.lock().unwrap() += 1;
        let all: Vec<String> = self.keys(bucket).into_iter().collect();
        let start = continuation_token
            .map(|after| all.iter().take_while(|k| **k <= after).count())
            .unwrap_or(0);
        let page: Vec<String> = all.iter().skip(start).take(self.page_size).cloned().collect();
        let next_continuation_token = if start + page.len() < all.len() {
            page.last().cloned()
        } else {
            None
        };
        Ok(ObjectPage {
            keys: page,
            next_continuation_token,
        })
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StorageResult<usize> {
        self.check(bucket)?;
        let call = {
            let mut calls = self.delete_calls.lock().unwrap();
            calls.push((bucket.to_string(), keys.to_vec()));
            calls.len()
        };
        if self.failing_delete_call == Some(call) {
            return Err(StorageError::remote(bucket, "slow down"));
        }
        if let Some(token) = &self.cancel_on_delete {
            token.cancel();
        }
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets.entry(bucket.to_string()).or_default();
        Ok(keys.iter().filter(|k| objects.remove(k.as_str())).count())
    }

    async fn presign_put(&self, bucket: &str, key: &str, ttl: Duration) -> StorageResult<String> {
        self.check(bucket)?;
        Ok(format!("{ENDPOINT}/{bucket}/{key}?X-Amz-Expires={}", ttl.as_secs()))
    }
}

pub struct FakeFactory(pub Arc<FakeObjectStore>);

impl ObjectStoreFactory for FakeFactory {
    fn connect(&self, _settings: &BucketSettings) -> StorageResult<Arc<dyn ObjectStore>> {
        Ok(self.0.clone())
    }
}
