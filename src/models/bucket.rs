//! Aggregation unit for one physical bucket during reconciliation.

use super::field::BucketSettings;
use serde::Serialize;
use std::collections::BTreeSet;

/// Identity of a bucket: the same name on two endpoints is two buckets.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId {
    pub endpoint: String,
    pub bucket: String,
}

impl From<&BucketSettings> for BucketId {
    fn from(settings: &BucketSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            bucket: settings.bucket.clone(),
        }
    }
}

/// A bucket plus every object key currently referenced by a record.
///
/// All file fields pointing at the same endpoint and bucket share one target;
/// the credentials of the first field registered are used to connect.
#[derive(Clone, Debug)]
pub struct BucketTarget {
    pub id: BucketId,
    pub settings: BucketSettings,
    pub referenced: BTreeSet<String>,
}

impl BucketTarget {
    pub fn new(settings: BucketSettings) -> Self {
        Self {
            id: BucketId::from(&settings),
            settings,
            referenced: BTreeSet::new(),
        }
    }

    pub fn reference_all(&mut self, keys: impl IntoIterator<Item = String>) {
        self.referenced.extend(keys);
    }

    pub fn is_referenced(&self, key: &str) -> bool {
        self.referenced.contains(key)
    }
}
