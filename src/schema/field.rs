use crate::permissions::types::policy::PermissionLevel;
use serde::{Deserialize, Serialize};

/// Kind of collection a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    List,
    Set,
}

/// Declared type of a field.
///
/// Type keys name either a leaf type (`string`, `integer`, ...) or a
/// catalogued record type. Whether a key is treated as a leaf is decided by
/// the filter's opaque set, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A single value of the named type
    Single(String),
    /// A homogeneous collection of the named element type
    Collection {
        kind: CollectionKind,
        element: String,
    },
}

impl FieldType {
    pub fn single(type_key: impl Into<String>) -> Self {
        FieldType::Single(type_key.into())
    }

    pub fn list_of(element: impl Into<String>) -> Self {
        FieldType::Collection {
            kind: CollectionKind::List,
            element: element.into(),
        }
    }

    pub fn set_of(element: impl Into<String>) -> Self {
        FieldType::Collection {
            kind: CollectionKind::Set,
            element: element.into(),
        }
    }

    /// The type key of the value, or of each element for collections.
    pub fn type_key(&self) -> &str {
        match self {
            FieldType::Single(key) => key,
            FieldType::Collection { element, .. } => element,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, FieldType::Collection { .. })
    }
}

/// A declared field of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Field-level permission marker; a marked field's permission is locked
    /// to this level by the catalog.
    #[serde(default)]
    pub marker: Option<PermissionLevel>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            marker: None,
        }
    }

    pub fn marked(mut self, level: PermissionLevel) -> Self {
        self.marker = Some(level);
        self
    }
}
