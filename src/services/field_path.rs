//! Field-path resolution against fieldable schemas.
//!
//! A field path is a slash-delimited list of field identifiers, e.g.
//! `gallery/photo`. Every segment but the last must name a `collection`
//! field; the last must name a `file` field. Collections are expanded into
//! transient schema nodes only for the duration of a call.

use crate::{
    errors::{StorageError, StorageResult},
    models::{
        field::FieldDefinition,
        fieldable::{Fieldable, MAX_NESTING_DEPTH},
    },
};
use std::sync::Arc;

/// A `file` field found while enumerating a schema, with its full path.
#[derive(Clone, Debug)]
pub struct FileFieldRef {
    pub path: String,
    pub field: FieldDefinition,
}

/// Resolve `path` against `fieldable` to the terminal `file` field.
///
/// Pure: reads the schema only. Fails with `FieldNotFound` on an unknown
/// segment, an empty segment, a non-collection in the middle of the path or
/// a non-file field at the end.
pub fn resolve_file_field(fieldable: &Fieldable, path: &str) -> StorageResult<FieldDefinition> {
    resolve_at(fieldable, path, 0).ok_or_else(|| StorageError::FieldNotFound(path.to_string()))
}

fn resolve_at(fieldable: &Fieldable, path: &str, depth: usize) -> Option<FieldDefinition> {
    if depth >= MAX_NESTING_DEPTH {
        return None;
    }

    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    if head.is_empty() {
        return None;
    }
    let field = fieldable.field(head)?;

    let Some(rest) = rest else {
        return field.is_file().then(|| field.clone());
    };

    if !field.is_collection() {
        return None;
    }
    let next = rest.split('/').next().unwrap_or_default();
    let nested = field.settings.nested_field(next)?;

    // Single-field stand-in of the same flavor as the schema we came from.
    let transient = Fieldable::root(
        None,
        fieldable.flavor().root_kind(),
        field.identifier.clone(),
        vec![nested],
    );
    resolve_at(&transient, rest, depth + 1)
}

/// Enumerate every `file` field of `root`, descending through collections.
pub fn file_fields(root: &Arc<Fieldable>) -> Vec<FileFieldRef> {
    let mut found = Vec::new();
    collect_file_fields(root, 0, &mut found);
    found
}

fn collect_file_fields(node: &Arc<Fieldable>, depth: usize, found: &mut Vec<FileFieldRef>) {
    for field in node.fields() {
        if field.is_file() {
            found.push(FileFieldRef {
                path: node.field_path(field),
                field: field.clone(),
            });
        } else if field.is_collection() && depth + 1 < MAX_NESTING_DEPTH {
            let child = Arc::new(Fieldable::collection(node.clone(), field));
            collect_file_fields(&child, depth + 1, found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        field::{FieldSettings, FieldType},
        fieldable::FieldableKind,
    };
    use serde_json::json;

    fn schema(kind: FieldableKind) -> Arc<Fieldable> {
        let field = |value| serde_json::from_value::<FieldDefinition>(value).unwrap();
        Arc::new(Fieldable::root(
            None,
            kind,
            "page",
            vec![
                field(json!({"identifier": "avatar", "type": "file", "settings": {"file_types": "png"}})),
                field(json!({"identifier": "title", "type": "text"})),
                field(json!({"identifier": "gallery", "type": "collection", "settings": {"fields": [
                    {"identifier": "photo", "title": "Photo", "type": "file", "settings": {}},
                    {"identifier": "caption", "title": "Caption", "type": "text", "settings": {}},
                    {"identifier": "slides", "title": "Slides", "type": "collection", "settings": {"fields": [
                        {"identifier": "image", "title": "Image", "type": "file", "settings": {}}
                    ]}}
                ]}})),
                field(json!({"identifier": "empty", "type": "collection", "settings": {}})),
            ],
        ))
    }

    #[test]
    fn resolves_top_level_file_field() {
        let root = schema(FieldableKind::ContentType);
        let field = resolve_file_field(&root, "avatar").unwrap();
        assert_eq!(field.identifier, "avatar");
        assert_eq!(field.settings.file_types(), Some("png"));
    }

    #[test]
    fn resolves_nested_collection_paths() {
        let root = schema(FieldableKind::SettingType);
        assert_eq!(resolve_file_field(&root, "gallery/photo").unwrap().identifier, "photo");
        assert_eq!(
            resolve_file_field(&root, "gallery/slides/image").unwrap().identifier,
            "image"
        );
    }

    #[test]
    fn non_file_terminal_is_not_found() {
        let root = schema(FieldableKind::ContentType);
        for path in ["title", "gallery", "gallery/caption", "gallery/slides"] {
            assert!(
                matches!(resolve_file_field(&root, path), Err(StorageError::FieldNotFound(p)) if p == path),
                "{path} should not resolve"
            );
        }
    }

    #[test]
    fn malformed_paths_are_not_found() {
        let root = schema(FieldableKind::ContentType);
        for path in [
            "",
            "/avatar",
            "avatar/",
            "Avatar",
            "missing",
            "title/avatar",
            "gallery/missing",
            "gallery//photo",
            "empty/photo",
            "avatar/photo",
        ] {
            assert!(resolve_file_field(&root, path).is_err(), "{path} should not resolve");
        }
    }

    #[test]
    fn resolution_is_repeatable_and_leaves_schema_untouched() {
        let root = schema(FieldableKind::ContentType);
        let before = root.fields().to_vec();
        let first = resolve_file_field(&root, "gallery/photo").unwrap();
        let second = resolve_file_field(&root, "gallery/photo").unwrap();
        assert_eq!(first, second);
        assert_eq!(root.fields(), before.as_slice());
    }

    #[test]
    fn enumerated_paths_resolve_back_to_their_fields() {
        let root = schema(FieldableKind::ContentType);
        let found = file_fields(&root);
        let paths: Vec<_> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["avatar", "gallery/photo", "gallery/slides/image"]);
        for file in &found {
            assert_eq!(resolve_file_field(&root, &file.path).unwrap(), file.field);
        }
    }

    #[test]
    fn deep_nesting_stops_at_depth_limit() {
        let mut field = FieldDefinition::new("leaf", FieldType::File, FieldSettings::default());
        for level in 0..(MAX_NESTING_DEPTH + 2) {
            let settings: FieldSettings =
                serde_json::from_value(json!({"fields": [serde_json::to_value(&field).unwrap()]}))
                    .unwrap();
            field = FieldDefinition::new(format!("c{level}"), FieldType::Collection, settings);
        }
        let root = Arc::new(Fieldable::root(None, FieldableKind::ContentType, "deep", vec![field]));
        assert!(file_fields(&root).is_empty());
    }
}
