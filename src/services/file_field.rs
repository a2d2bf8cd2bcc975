//! Rules of the `file` field type: settings validation at schema time, value
//! validation at record-write time, and public URL reconstruction on read.

use crate::{
    errors::{StorageError, StorageResult},
    models::{
        field::{BucketSettings, FieldDefinition, FieldSettings, is_empty_value},
        fieldable::{Fieldable, MAX_NESTING_DEPTH},
        record::StoredFile,
    },
    services::{field_path::file_fields, signer},
};
use serde::Serialize;
use serde_json::Value;
use std::{fmt, sync::Arc};
use url::Url;

const ALLOWED_SETTINGS: [&str; 2] = ["file_types", "bucket"];
const REQUIRED_BUCKET_KEYS: [&str; 4] = ["endpoint", "key", "secret", "bucket"];

/// One problem found while validating settings or data.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Property path, e.g. `bucket.endpoint` or `[avatar]`.
    pub path: String,
    pub message: &'static str,
}

impl Violation {
    fn new(path: impl Into<String>, message: &'static str) -> Self {
        Self {
            path: path.into(),
            message,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate the settings bag of a `file` field.
pub fn validate_settings(settings: &FieldSettings) -> Vec<Violation> {
    let mut violations: Vec<Violation> = settings
        .0
        .keys()
        .filter(|key| !ALLOWED_SETTINGS.contains(&key.as_str()))
        .map(|key| Violation::new(key.clone(), "validation.additional_data"))
        .collect();

    let bucket = match settings.get("bucket") {
        Some(Value::Object(bucket)) if !bucket.is_empty() => bucket,
        _ => {
            violations.push(Violation::new("bucket", "validation.required"));
            return violations;
        }
    };
    if !violations.is_empty() {
        return violations;
    }

    for key in REQUIRED_BUCKET_KEYS {
        if !bucket.get(key).is_some_and(Value::is_string) {
            violations.push(Violation::new(format!("bucket.{key}"), "validation.required"));
        }
    }
    if !violations.is_empty() {
        return violations;
    }

    let endpoint = bucket.get("endpoint").and_then(Value::as_str).unwrap_or_default();
    if !is_absolute_http_url(endpoint) {
        violations.push(Violation::new("bucket.endpoint", "validation.absolute_url"));
    }

    violations
}

/// Validate a field definition before it is stored on a schema.
///
/// `file` fields are checked directly; `collection` fields are checked
/// through every embedded definition, with paths prefixed accordingly.
pub fn validate_field(field: &FieldDefinition) -> Vec<Violation> {
    validate_field_at(field, "", 0)
}

fn validate_field_at(field: &FieldDefinition, prefix: &str, depth: usize) -> Vec<Violation> {
    let path = format!("{prefix}{}", field.identifier);
    if field.is_file() {
        return validate_settings(&field.settings)
            .into_iter()
            .map(|v| Violation::new(format!("{path}.{}", v.path), v.message))
            .collect();
    }
    if field.is_collection() && depth + 1 < MAX_NESTING_DEPTH {
        let prefix = format!("{path}/");
        return field
            .settings
            .nested_fields()
            .iter()
            .flat_map(|nested| validate_field_at(nested, &prefix, depth + 1))
            .collect();
    }
    Vec::new()
}

fn is_absolute_http_url(endpoint: &str) -> bool {
    // `Url::parse` strips surrounding whitespace, so check the raw value too.
    if endpoint.chars().any(char::is_whitespace) {
        return false;
    }
    match Url::parse(endpoint) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// Validate one stored file value for the field `identifier`.
///
/// An empty value means "no file" and is valid. Otherwise all of `size`,
/// `id`, `name` and `checksum` must be present and the checksum must match.
pub fn validate_data(identifier: &str, value: &Value, secret: &str) -> StorageResult<()> {
    if is_empty_value(value) {
        return Ok(());
    }

    let complete = ["size", "id", "name", "checksum"]
        .iter()
        .all(|key| value.get(key).is_some_and(|v| !is_empty_value(v)));
    let file = if complete {
        serde_json::from_value::<StoredFile>(value.clone()).ok()
    } else {
        None
    };
    let Some(file) = file else {
        return Err(StorageError::invalid(format!(
            "[{identifier}]: validation.missing_definition"
        )));
    };

    if signer::verify(secret, &file.id, &file.name, &file.checksum) {
        Ok(())
    } else {
        Err(StorageError::IntegrityViolation {
            field: identifier.to_string(),
        })
    }
}

/// Validate every `file` value a record's data tree holds for `root`.
///
/// Values nested in collections are visited entry by entry, like the
/// reference walk in reconciliation.
pub fn validate_record_data(root: &Arc<Fieldable>, data: &Value, secret: &str) -> StorageResult<()> {
    for file_field in file_fields(root) {
        let segments: Vec<&str> = file_field.path.split('/').collect();
        validate_at(data, &segments, &file_field.path, secret)?;
    }
    Ok(())
}

fn validate_at(data: &Value, segments: &[&str], path: &str, secret: &str) -> StorageResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };
    let Some(value) = data.get(*head) else {
        return Ok(());
    };
    if rest.is_empty() {
        return validate_data(path, value, secret);
    }
    match value {
        Value::Array(entries) => entries
            .iter()
            .try_for_each(|entry| validate_at(entry, rest, path, secret)),
        Value::Object(_) => validate_at(value, rest, path, secret),
        _ => Ok(()),
    }
}

/// Public URL of a stored file: `endpoint/bucket/id/name`.
pub fn public_url(bucket: &BucketSettings, file: &StoredFile) -> String {
    format!("{}/{}", bucket.location(), file.object_key())
}
