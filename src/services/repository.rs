//! Schema and record storage.
//!
//! `SchemaRepository` is the read seam used by upload signing and
//! reconciliation. `SqliteRepository` implements it on top of SQLite and also
//! owns the validated write path for schemas and records.

use crate::{
    errors::{StorageError, StorageResult},
    models::{
        field::{FieldDefinition, FieldSettings},
        fieldable::{Fieldable, FieldableKind},
        record::{Record, RecordRow},
    },
    services::file_field,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[async_trait]
pub trait SchemaRepository: Send + Sync {
    /// Every content type and setting type, fields in declaration order.
    async fn root_fieldables(&self) -> StorageResult<Vec<Arc<Fieldable>>>;

    async fn find_fieldable(
        &self,
        kind: FieldableKind,
        identifier: &str,
    ) -> StorageResult<Option<Arc<Fieldable>>>;

    /// Records written against `fieldable`'s root.
    ///
    /// Soft-deleted records are returned only when `include_soft_deleted`
    /// is set. Rows whose data cannot be decoded are skipped.
    async fn records_of(
        &self,
        fieldable: &Fieldable,
        include_soft_deleted: bool,
    ) -> StorageResult<Vec<Record>>;

    /// Check connectivity with the backing store.
    async fn health_check(&self) -> StorageResult<()>;
}

#[derive(FromRow, Debug)]
struct FieldableRow {
    id: Uuid,
    kind: String,
    identifier: String,
}

#[derive(FromRow, Debug)]
struct FieldRow {
    fieldable_id: Uuid,
    identifier: String,
    title: String,
    field_type: String,
    settings: String,
}

impl FieldRow {
    fn into_definition(self) -> StorageResult<FieldDefinition> {
        let settings: FieldSettings = serde_json::from_str(&self.settings)?;
        Ok(FieldDefinition {
            identifier: self.identifier,
            title: self.title,
            field_type: self.field_type.into(),
            settings,
        })
    }
}

#[derive(Clone)]
pub struct SqliteRepository {
    pub db: Arc<SqlitePool>,
}

impl SqliteRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema migration statement by statement.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Register a new root schema and return its id.
    pub async fn create_fieldable(
        &self,
        kind: FieldableKind,
        identifier: &str,
        title: &str,
    ) -> StorageResult<Uuid> {
        if kind == FieldableKind::Collection {
            return Err(StorageError::invalid("collections are not stored as schemas"));
        }
        if identifier.is_empty() || identifier.contains('/') {
            return Err(StorageError::invalid(format!(
                "invalid {} identifier `{identifier}`",
                kind.as_str()
            )));
        }

        let id = Uuid::new_v4();
        match sqlx::query(
            "INSERT INTO fieldables (id, kind, identifier, title, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(identifier)
        .bind(title)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(id),
            Err(err) if is_unique_violation(&err) => Err(StorageError::invalid(format!(
                "{} `{identifier}` already exists",
                kind.as_str()
            ))),
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Append a field to a stored schema after validating its settings.
    pub async fn add_field(&self, fieldable_id: Uuid, field: &FieldDefinition) -> StorageResult<()> {
        if field.identifier.is_empty() || field.identifier.contains('/') {
            return Err(StorageError::invalid(format!(
                "invalid field identifier `{}`",
                field.identifier
            )));
        }

        let violations = file_field::validate_field(field);
        if !violations.is_empty() {
            let reasons = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(StorageError::invalid(reasons));
        }

        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM fieldable_fields WHERE fieldable_id = ?",
        )
        .bind(fieldable_id)
        .fetch_one(&*self.db)
        .await?;

        match sqlx::query(
            "INSERT INTO fieldable_fields
                (id, fieldable_id, identifier, title, field_type, settings, position)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(fieldable_id)
        .bind(&field.identifier)
        .bind(&field.title)
        .bind(field.field_type.as_str())
        .bind(serde_json::to_string(&field.settings)?)
        .bind(position)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::invalid(format!(
                "field `{}` already exists",
                field.identifier
            ))),
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Store a new record; every file value in `data` must verify.
    pub async fn insert_record(
        &self,
        root: &Arc<Fieldable>,
        data: Value,
        secret: &str,
    ) -> StorageResult<Record> {
        let fieldable_id = root
            .id
            .ok_or_else(|| StorageError::invalid("records need a stored schema"))?;
        file_field::validate_record_data(root, &data, secret)?;

        let record = Record {
            id: Uuid::new_v4(),
            fieldable_id,
            data,
            created_at: Utc::now(),
            deleted_at: None,
        };

        sqlx::query(
            "INSERT INTO records (id, fieldable_id, data, created_at, deleted_at)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(record.id)
        .bind(record.fieldable_id)
        .bind(serde_json::to_string(&record.data)?)
        .bind(record.created_at)
        .execute(&*self.db)
        .await?;

        Ok(record)
    }

    /// Mark a record deleted without dropping the row.
    pub async fn soft_delete_record(&self, id: Uuid) -> StorageResult<bool> {
        let result =
            sqlx::query("UPDATE records SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(Utc::now())
                .bind(id)
                .execute(&*self.db)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_fieldables(&self, rows: Vec<FieldableRow>) -> StorageResult<Vec<Arc<Fieldable>>> {
        let mut fields_by_owner: HashMap<Uuid, Vec<FieldDefinition>> = HashMap::new();
        let field_rows: Vec<FieldRow> = sqlx::query_as(
            "SELECT fieldable_id, identifier, title, field_type, settings
             FROM fieldable_fields ORDER BY fieldable_id, position",
        )
        .fetch_all(&*self.db)
        .await?;
        for row in field_rows {
            let owner = row.fieldable_id;
            fields_by_owner
                .entry(owner)
                .or_default()
                .push(row.into_definition()?);
        }

        let mut fieldables = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(kind) = FieldableKind::parse(&row.kind) else {
                warn!(kind = %row.kind, identifier = %row.identifier, "skipping unknown schema kind");
                continue;
            };
            let fields = fields_by_owner.remove(&row.id).unwrap_or_default();
            fieldables.push(Arc::new(Fieldable::root(
                Some(row.id),
                kind,
                row.identifier,
                fields,
            )));
        }
        Ok(fieldables)
    }
}

#[async_trait]
impl SchemaRepository for SqliteRepository {
    async fn root_fieldables(&self) -> StorageResult<Vec<Arc<Fieldable>>> {
        let rows: Vec<FieldableRow> =
            sqlx::query_as("SELECT id, kind, identifier FROM fieldables ORDER BY kind, identifier")
                .fetch_all(&*self.db)
                .await?;
        self.load_fieldables(rows).await
    }

    async fn find_fieldable(
        &self,
        kind: FieldableKind,
        identifier: &str,
    ) -> StorageResult<Option<Arc<Fieldable>>> {
        let rows: Vec<FieldableRow> =
            sqlx::query_as("SELECT id, kind, identifier FROM fieldables WHERE kind = ? AND identifier = ?")
                .bind(kind.as_str())
                .bind(identifier)
                .fetch_all(&*self.db)
                .await?;
        Ok(self.load_fieldables(rows).await?.into_iter().next())
    }

    async fn records_of(
        &self,
        fieldable: &Fieldable,
        include_soft_deleted: bool,
    ) -> StorageResult<Vec<Record>> {
        let Some(fieldable_id) = fieldable.root_of().id else {
            return Ok(Vec::new());
        };

        let rows: Vec<RecordRow> = sqlx::query_as(
            "SELECT id, fieldable_id, data, created_at, deleted_at
             FROM records
             WHERE fieldable_id = ? AND (? OR deleted_at IS NULL)
             ORDER BY created_at",
        )
        .bind(fieldable_id)
        .bind(include_soft_deleted)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                Record::try_from(row)
                    .map_err(|err| warn!(record = %id, error = %err, "skipping undecodable record"))
                    .ok()
            })
            .collect())
    }

    async fn health_check(&self) -> StorageResult<()> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&*self.db).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(StorageError::invalid(format!("unexpected result: {one}")))
        }
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
