//! Fieldables: schema nodes that own an ordered set of field definitions.
//!
//! Content types and setting types are persisted roots. Collections are
//! synthesized on demand from the settings of a `collection` field and carry
//! a link to the fieldable they were expanded from; they are never stored.

use super::field::FieldDefinition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Guard against runaway parent chains.
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldableKind {
    ContentType,
    SettingType,
    Collection,
}

impl FieldableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldableKind::ContentType => "content_type",
            FieldableKind::SettingType => "setting_type",
            FieldableKind::Collection => "collection",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "content_type" => Some(FieldableKind::ContentType),
            "setting_type" => Some(FieldableKind::SettingType),
            "collection" => Some(FieldableKind::Collection),
            _ => None,
        }
    }
}

/// Whether a schema tree ultimately belongs to content or to settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaFlavor {
    Content,
    Setting,
}

impl SchemaFlavor {
    /// Kind of the transient root built while resolving nested paths.
    pub fn root_kind(self) -> FieldableKind {
        match self {
            SchemaFlavor::Content => FieldableKind::ContentType,
            SchemaFlavor::Setting => FieldableKind::SettingType,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Fieldable {
    /// Storage id; `None` for transient nodes.
    pub id: Option<Uuid>,
    pub kind: FieldableKind,
    pub identifier: String,
    fields: Vec<FieldDefinition>,
    parent: Option<Arc<Fieldable>>,
}

impl Fieldable {
    /// A persisted (or persistable) root schema.
    pub fn root(
        id: Option<Uuid>,
        kind: FieldableKind,
        identifier: impl Into<String>,
        fields: Vec<FieldDefinition>,
    ) -> Self {
        let mut fieldable = Self {
            id,
            kind,
            identifier: identifier.into(),
            fields: Vec::with_capacity(fields.len()),
            parent: None,
        };
        for field in fields {
            fieldable.add_field(field);
        }
        fieldable
    }

    /// Expand a `collection` field into a nested node linked to `parent`.
    pub fn collection(parent: Arc<Fieldable>, field: &FieldDefinition) -> Self {
        let mut fieldable = Self {
            id: None,
            kind: FieldableKind::Collection,
            identifier: field.identifier.clone(),
            fields: Vec::new(),
            parent: Some(parent),
        };
        for nested in field.settings.nested_fields() {
            fieldable.add_field(nested);
        }
        fieldable
    }

    /// Adds a field unless one with the same identifier already exists.
    pub fn add_field(&mut self, field: FieldDefinition) -> bool {
        if self.field(&field.identifier).is_some() {
            return false;
        }
        self.fields.push(field);
        true
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, identifier: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.identifier == identifier)
    }

    pub fn parent(&self) -> Option<&Arc<Fieldable>> {
        self.parent.as_ref()
    }

    pub fn is_nested(&self) -> bool {
        self.kind == FieldableKind::Collection
    }

    /// Walk the parent chain up to the persisted root.
    pub fn root_of(&self) -> &Fieldable {
        let mut current = self;
        for _ in 0..MAX_NESTING_DEPTH {
            match current.parent.as_deref() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    pub fn flavor(&self) -> SchemaFlavor {
        match self.root_of().kind {
            FieldableKind::ContentType => SchemaFlavor::Content,
            _ => SchemaFlavor::Setting,
        }
    }

    /// Slash-terminated path of collection identifiers leading to this node.
    ///
    /// Empty for roots; `gallery/` for a collection expanded from the
    /// `gallery` field of a root; `gallery/slides/` one level deeper.
    pub fn path_prefix(&self) -> String {
        let mut segments = Vec::new();
        let mut current = self;
        for _ in 0..MAX_NESTING_DEPTH {
            if !current.is_nested() {
                break;
            }
            segments.push(current.identifier.as_str());
            match current.parent.as_deref() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments
            .iter()
            .rev()
            .map(|segment| format!("{segment}/"))
            .collect()
    }

    /// Full slash-delimited path of `field` as addressed from the root.
    pub fn field_path(&self, field: &FieldDefinition) -> String {
        format!("{}{}", self.path_prefix(), field.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::{FieldSettings, FieldType};
    use serde_json::json;

    fn gallery() -> FieldDefinition {
        let settings: FieldSettings = serde_json::from_value(json!({
            "fields": [
                {"identifier": "photo", "type": "file"},
                {"identifier": "slides", "type": "collection", "settings": {
                    "fields": [{"identifier": "image", "type": "file"}]
                }}
            ]
        }))
        .unwrap();
        FieldDefinition::new("gallery", FieldType::Collection, settings)
    }

    #[test]
    fn duplicate_identifiers_are_ignored() {
        let mut root = Fieldable::root(None, FieldableKind::ContentType, "news", vec![]);
        assert!(root.add_field(FieldDefinition::new("a", "text", FieldSettings::default())));
        assert!(!root.add_field(FieldDefinition::new("a", "file", FieldSettings::default())));
        assert_eq!(root.fields().len(), 1);
        assert_eq!(root.fields()[0].field_type, FieldType::Other("text".into()));
    }

    #[test]
    fn nested_collections_build_path_prefix_and_find_root() {
        let root = Arc::new(Fieldable::root(
            None,
            FieldableKind::SettingType,
            "site",
            vec![gallery()],
        ));
        let level1 = Arc::new(Fieldable::collection(root.clone(), &gallery()));
        let slides = level1.field("slides").unwrap().clone();
        let level2 = Fieldable::collection(level1.clone(), &slides);

        assert_eq!(root.path_prefix(), "");
        assert_eq!(level1.path_prefix(), "gallery/");
        assert_eq!(level2.path_prefix(), "gallery/slides/");
        assert_eq!(
            level2.field_path(level2.field("image").unwrap()),
            "gallery/slides/image"
        );
        assert_eq!(level2.root_of().identifier, "site");
        assert_eq!(level2.flavor(), SchemaFlavor::Setting);
    }
}
