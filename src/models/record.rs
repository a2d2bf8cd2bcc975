//! Records (content and setting instances) and the stored shape of a file value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A content or setting instance belonging to one root fieldable.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Record {
    pub id: Uuid,

    /// Root fieldable this record was written against.
    pub fieldable_id: Uuid,

    /// Data tree keyed by field identifiers, mirroring the schema nesting.
    pub data: Value,

    pub created_at: DateTime<Utc>,

    /// Set when the record is soft-deleted.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Raw row; `data` is kept as JSON text in SQLite.
#[derive(FromRow, Debug)]
pub(crate) struct RecordRow {
    pub id: Uuid,
    pub fieldable_id: Uuid,
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<RecordRow> for Record {
    type Error = serde_json::Error;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Record {
            id: row.id,
            fieldable_id: row.fieldable_id,
            data: serde_json::from_str(&row.data)?,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Value persisted for a `file` field.
///
/// The object key is `id/name`; the public URL is rebuilt from the field's
/// bucket settings on read and never stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub checksum: String,
}

impl StoredFile {
    pub fn object_key(&self) -> String {
        object_key(&self.id, &self.name)
    }
}

pub fn object_key(id: &str, name: &str) -> String {
    format!("{id}/{name}")
}
