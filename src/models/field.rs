//! Field definitions: typed entries of a fieldable schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared type tag of a field.
///
/// Only `file` and `collection` carry meaning for storage; every other
/// domain type is kept verbatim so settings round-trip untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    File,
    Collection,
    Other(String),
}

impl FieldType {
    pub const FILE: &'static str = "file";
    pub const COLLECTION: &'static str = "collection";

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::File => Self::FILE,
            FieldType::Collection => Self::COLLECTION,
            FieldType::Other(tag) => tag,
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            Self::FILE => FieldType::File,
            Self::COLLECTION => FieldType::Collection,
            _ => FieldType::Other(tag),
        }
    }
}

impl From<&str> for FieldType {
    fn from(tag: &str) -> Self {
        FieldType::from(tag.to_string())
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.as_str().to_string()
    }
}

/// Connection parameters of the bucket a `file` field uploads into.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketSettings {
    /// Absolute `http(s)://` endpoint of the S3-compatible service.
    pub endpoint: String,

    /// Bucket name.
    pub bucket: String,

    /// Access key.
    #[serde(alias = "access_key")]
    pub key: String,

    /// Secret key.
    #[serde(alias = "secret_key")]
    pub secret: String,
}

impl BucketSettings {
    /// `endpoint/bucket`, used as the human-facing bucket label.
    pub fn location(&self) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), self.bucket)
    }
}

/// Free-form settings bag of a field definition.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct FieldSettings(pub Map<String, Value>);

impl FieldSettings {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Typed bucket descriptor, `None` when absent or malformed.
    pub fn bucket(&self) -> Option<BucketSettings> {
        self.0
            .get("bucket")
            .filter(|v| !is_empty_value(v))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Comma-separated extension allow-list, `None` when not declared.
    pub fn file_types(&self) -> Option<&str> {
        self.0
            .get("file_types")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Embedded field definitions of a `collection` field.
    ///
    /// Entries that do not parse as a definition are skipped.
    pub fn nested_fields(&self) -> Vec<FieldDefinition> {
        match self.0.get("fields") {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect(),
            Some(Value::Object(entries)) => entries
                .values()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Look up one embedded definition by identifier.
    pub fn nested_field(&self, identifier: &str) -> Option<FieldDefinition> {
        self.nested_fields()
            .into_iter()
            .find(|field| field.identifier == identifier)
    }
}

/// One field of a fieldable: identifier, declared type and settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    /// Unique within the owning fieldable. Case-sensitive.
    pub identifier: String,

    #[serde(default)]
    pub title: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub settings: FieldSettings,
}

impl FieldDefinition {
    pub fn new(
        identifier: impl Into<String>,
        field_type: impl Into<FieldType>,
        settings: FieldSettings,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            title: identifier.clone(),
            identifier,
            field_type: field_type.into(),
            settings,
        }
    }

    pub fn is_file(&self) -> bool {
        self.field_type == FieldType::File
    }

    pub fn is_collection(&self) -> bool {
        self.field_type == FieldType::Collection
    }
}

/// Mirrors the "empty" notion of loosely-typed settings: null, "", [], {}.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_tag_round_trips_unknown_types() {
        let field: FieldDefinition =
            serde_json::from_value(json!({"identifier": "body", "type": "wysiwyg"})).unwrap();
        assert_eq!(field.field_type, FieldType::Other("wysiwyg".into()));
        assert_eq!(serde_json::to_value(&field).unwrap()["type"], "wysiwyg");
    }

    #[test]
    fn bucket_settings_accept_long_key_names() {
        let settings: FieldSettings = serde_json::from_value(json!({
            "bucket": {
                "endpoint": "http://minio:9000",
                "bucket": "users",
                "access_key": "ak",
                "secret_key": "sk"
            }
        }))
        .unwrap();
        let bucket = settings.bucket().unwrap();
        assert_eq!(bucket.key, "ak");
        assert_eq!(bucket.location(), "http://minio:9000/users");
    }

    #[test]
    fn nested_fields_skip_garbage_entries() {
        let settings: FieldSettings = serde_json::from_value(json!({
            "fields": [
                {"identifier": "photo", "title": "Photo", "type": "file", "settings": {}},
                "not a field",
                {"identifier": "caption", "type": "text"}
            ]
        }))
        .unwrap();
        let ids: Vec<_> = settings
            .nested_fields()
            .into_iter()
            .map(|f| f.identifier)
            .collect();
        assert_eq!(ids, vec!["photo", "caption"]);
        assert!(settings.nested_field("missing").is_none());
    }
}
