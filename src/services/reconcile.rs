//! Bucket reconciliation: find (and optionally delete) objects that no
//! record references any more.
//!
//! Phases of one run:
//! 1. discover every `file` field of every schema, nested ones included,
//!    and group them by target bucket;
//! 2. walk all records of each schema, soft-deleted ones included, and
//!    collect the object keys they reference;
//! 3. list each bucket page by page and diff against the references;
//! 4. report, and in delete mode remove the unreferenced objects in batches.
//!
//! Steps 1-3 are read-only. Buckets are processed concurrently and a failure
//! in one bucket is recorded in its report without affecting the others.

use crate::{
    errors::StorageResult,
    models::bucket::{BucketId, BucketTarget},
    services::{
        field_path::file_fields,
        object_store::{ObjectStoreFactory, list_keys},
        record_walker::collect_keys,
        repository::SchemaRepository,
    },
};
use futures::{StreamExt, future::join_all, pin_mut};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound of keys per delete request (S3 `DeleteObjects` limit).
pub const MAX_DELETE_BATCH: usize = 1000;

/// Exit status of an interrupted run (128 + SIGINT).
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Report only.
    DryRun,
    /// Report, then delete unreferenced objects.
    Delete,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketReport {
    pub endpoint: String,
    pub bucket: String,
    pub referenced: BTreeSet<String>,
    pub unreferenced: BTreeSet<String>,
    /// Objects actually removed; `None` in dry-run mode.
    pub deleted: Option<usize>,
    /// Set when the run was cancelled while this bucket was in progress.
    pub cancelled: bool,
    /// First object store failure for this bucket, if any.
    pub error: Option<String>,
}

impl BucketReport {
    fn new(target: &BucketTarget) -> Self {
        Self {
            endpoint: target.id.endpoint.clone(),
            bucket: target.id.bucket.clone(),
            referenced: target.referenced.clone(),
            unreferenced: BTreeSet::new(),
            deleted: None,
            cancelled: false,
            error: None,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ReconciliationReport {
    pub mode: RunMode,
    pub buckets: Vec<BucketReport>,
}

impl ReconciliationReport {
    pub fn unreferenced_total(&self) -> usize {
        self.buckets.iter().map(|b| b.unreferenced.len()).sum()
    }

    pub fn deleted_total(&self) -> usize {
        self.buckets.iter().filter_map(|b| b.deleted).sum()
    }

    pub fn failed_buckets(&self) -> impl Iterator<Item = &BucketReport> {
        self.buckets.iter().filter(|b| b.error.is_some())
    }

    pub fn cancelled_buckets(&self) -> impl Iterator<Item = &BucketReport> {
        self.buckets.iter().filter(|b| b.cancelled)
    }

    /// Process exit status: 130 if the run was interrupted (the report is
    /// partial), 1 if any bucket failed, 2 if unreferenced objects were found
    /// (or removed), 0 when everything is referenced.
    pub fn exit_status(&self) -> u8 {
        if self.cancelled_buckets().next().is_some() {
            EXIT_CANCELLED
        } else if self.failed_buckets().next().is_some() {
            1
        } else if self.unreferenced_total() > 0 {
            2
        } else {
            0
        }
    }
}

pub struct ReconciliationEngine {
    repo: Arc<dyn SchemaRepository>,
    stores: Arc<dyn ObjectStoreFactory>,
    delete_batch_size: usize,
}

impl ReconciliationEngine {
    pub fn new(repo: Arc<dyn SchemaRepository>, stores: Arc<dyn ObjectStoreFactory>) -> Self {
        Self {
            repo,
            stores,
            delete_batch_size: MAX_DELETE_BATCH,
        }
    }

    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size.clamp(1, MAX_DELETE_BATCH);
        self
    }

    /// Discover buckets and aggregate every key referenced by a record.
    pub async fn collect_targets(&self) -> StorageResult<Vec<BucketTarget>> {
        let mut targets: BTreeMap<BucketId, BucketTarget> = BTreeMap::new();

        for root in self.repo.root_fieldables().await? {
            let mut bound: Vec<(String, BucketId)> = Vec::new();
            for file_field in file_fields(&root) {
                let Some(settings) = file_field.field.settings.bucket() else {
                    warn!(
                        schema = %root.identifier,
                        field = %file_field.path,
                        "file field without usable bucket settings"
                    );
                    continue;
                };
                let id = BucketId::from(&settings);
                targets
                    .entry(id.clone())
                    .or_insert_with(|| BucketTarget::new(settings));
                bound.push((file_field.path, id));
            }
            if bound.is_empty() {
                continue;
            }

            // Soft-deleted records still own their files until purged.
            let records = self.repo.records_of(&root, true).await?;
            debug!(schema = %root.identifier, records = records.len(), "walking records");

            for record in &records {
                for (path, id) in &bound {
                    if let Some(target) = targets.get_mut(id) {
                        target.reference_all(collect_keys(&record.data, path));
                    }
                }
            }
        }

        Ok(targets.into_values().collect())
    }

    /// Run one reconciliation pass.
    ///
    /// Cancelling `cancel` stops listing and deleting at the next key or
    /// batch boundary; deletions already made are reported, not undone.
    pub async fn run(
        &self,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> StorageResult<ReconciliationReport> {
        let targets = self.collect_targets().await?;
        info!(buckets = targets.len(), ?mode, "reconciling buckets");

        let buckets = join_all(
            targets
                .iter()
                .map(|target| self.reconcile_bucket(target, mode, cancel)),
        )
        .await;

        Ok(ReconciliationReport { mode, buckets })
    }

    async fn reconcile_bucket(
        &self,
        target: &BucketTarget,
        mode: RunMode,
        cancel: &CancellationToken,
    ) -> BucketReport {
        let mut report = BucketReport::new(target);
        let location = target.settings.location();

        let store = match self.stores.connect(&target.settings) {
            Ok(store) => store,
            Err(err) => {
                warn!(bucket = %location, error = %err, "cannot connect to bucket");
                report.error = Some(err.to_string());
                return report;
            }
        };

        let keys = list_keys(store.as_ref(), &target.id.bucket);
        pin_mut!(keys);
        let mut listed = 0usize;
        while let Some(item) = keys.next().await {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return report;
            }
            match item {
                Ok(key) => {
                    listed += 1;
                    if !target.is_referenced(&key) {
                        report.unreferenced.insert(key);
                    }
                }
                Err(err) => {
                    warn!(bucket = %location, error = %err, "listing failed");
                    report.error = Some(err.to_string());
                    return report;
                }
            }
        }

        info!(
            bucket = %location,
            listed,
            referenced = report.referenced.len(),
            unreferenced = report.unreferenced.len(),
            "bucket listed"
        );

        if mode == RunMode::DryRun {
            return report;
        }

        let pending: Vec<String> = report.unreferenced.iter().cloned().collect();
        let mut deleted = 0usize;
        for batch in pending.chunks(self.delete_batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match store.delete_objects(&target.id.bucket, batch).await {
                Ok(count) => {
                    deleted += count;
                    debug!(bucket = %location, batch = batch.len(), count, "batch deleted");
                }
                Err(err) => {
                    warn!(bucket = %location, error = %err, deleted, "delete failed");
                    report.error = Some(err.to_string());
                    break;
                }
            }
        }
        report.deleted = Some(deleted);

        info!(bucket = %location, deleted, "unreferenced objects deleted");
        report
    }
}
