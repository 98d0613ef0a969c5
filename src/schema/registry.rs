//! Explicit per-type descriptor table.
//!
//! Types are registered once at startup with their fields and markers. The
//! registry then serves as both the property accessor used by the filter and
//! the type catalog used by the reconciler.

use crate::error::{FilterError, FilterResult};
use crate::permissions::types::policy::{Access, AccessLevel, Permission};
use crate::schema::accessor::PropertyAccessor;
use crate::schema::catalog::{build_display_name, namespace_matches, CatalogDefaults, TypeCatalog};
use crate::schema::field::{FieldDescriptor, FieldType};
use crate::schema::value::{Record, RecordRef, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the registry knows about one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub type_key: String,
    pub namespace: String,
    /// Label used for display-name lookups; the type key when absent
    #[serde(default)]
    pub display_name: Option<String>,
    /// Type whose fields this one inherits
    #[serde(default)]
    pub parent: Option<String>,
    /// Type-level access marker; locks the access to this level
    #[serde(default)]
    pub marker: Option<AccessLevel>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Fields compared when matching collection elements; all fields when empty
    #[serde(default)]
    pub identity_fields: Vec<String>,
    #[serde(default = "default_true")]
    pub constructible: bool,
    #[serde(default)]
    pub is_abstract: bool,
    /// Whether the catalog hands this type out for filtering
    #[serde(default = "default_true")]
    pub target: bool,
    /// Opted out of filtering; treated as an opaque leaf
    #[serde(default)]
    pub ignored: bool,
}

fn default_true() -> bool {
    true
}

impl TypeDescriptor {
    pub fn new(type_key: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            namespace: namespace.into(),
            display_name: None,
            parent: None,
            marker: None,
            fields: Vec::new(),
            identity_fields: Vec::new(),
            constructible: true,
            is_abstract: false,
            target: true,
            ignored: false,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn marked(mut self, level: AccessLevel) -> Self {
        self.marker = Some(level);
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn identity<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_default_constructor(mut self) -> Self {
        self.constructible = false;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn not_target(mut self) -> Self {
        self.target = false;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Registry of record types, implementing [`PropertyAccessor`] and [`TypeCatalog`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDescriptor>,
    defaults: CatalogDefaults,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_defaults(&mut self, defaults: CatalogDefaults) {
        self.defaults = defaults;
    }

    /// Registers or replaces a type.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        debug!("Registering type {}", descriptor.type_key);
        self.types.insert(descriptor.type_key.clone(), descriptor);
        self
    }

    pub fn descriptor(&self, type_key: &str) -> FilterResult<&TypeDescriptor> {
        self.types
            .get(type_key)
            .ok_or_else(|| FilterError::type_not_registered(type_key))
    }

    /// Fields of the type and its ancestors; a redeclared field replaces the inherited one.
    fn collect_fields(&self, type_key: &str) -> FilterResult<Vec<FieldDescriptor>> {
        let mut chain = Vec::new();
        let mut current = Some(type_key.to_string());
        while let Some(key) = current {
            if chain.iter().any(|d: &&TypeDescriptor| d.type_key == key) {
                return Err(FilterError::InvalidArgument(format!(
                    "Type {} has a cyclic parent chain",
                    type_key
                )));
            }
            let descriptor = self.descriptor(&key)?;
            current = descriptor.parent.clone();
            chain.push(descriptor);
        }

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for descriptor in chain.into_iter().rev() {
            for field in &descriptor.fields {
                match fields.iter_mut().find(|f| f.name == field.name) {
                    Some(existing) => *existing = field.clone(),
                    None => fields.push(field.clone()),
                }
            }
        }
        Ok(fields)
    }

    fn default_access(&self, descriptor: &TypeDescriptor) -> FilterResult<Access> {
        let (level, locked) = match descriptor.marker {
            Some(level) => (level, true),
            None => (self.defaults.access, false),
        };
        let display_name = descriptor
            .display_name
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| descriptor.type_key.clone());

        let mut permissions: Vec<Permission> = self
            .collect_fields(&descriptor.type_key)?
            .into_iter()
            .map(|field| {
                let (level, locked) = match field.marker {
                    Some(level) => (level, true),
                    None => (self.defaults.permission, false),
                };
                Permission::new(field.name.clone(), level, locked)
                    .with_display_name(build_display_name(&field.name))
            })
            .collect();
        permissions.sort_by(|a, b| a.property_name.cmp(&b.property_name));

        let mut access = Access::new(descriptor.type_key.clone(), level, locked)
            .with_display_name(display_name);
        access.permissions = permissions;
        Ok(access)
    }

    fn in_namespace<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a TypeDescriptor> {
        self.types
            .values()
            .filter(move |d| namespace_matches(namespace, &d.namespace))
    }
}

impl PropertyAccessor for TypeRegistry {
    fn fields(&self, type_key: &str) -> FilterResult<Vec<FieldDescriptor>> {
        self.collect_fields(type_key)
    }

    fn new_instance(&self, type_key: &str) -> FilterResult<RecordRef> {
        let descriptor = self
            .descriptor(type_key)
            .map_err(|_| FilterError::construction_failure(type_key, "type is not registered"))?;
        if descriptor.is_abstract {
            return Err(FilterError::construction_failure(type_key, "type is abstract"));
        }
        if !descriptor.constructible {
            return Err(FilterError::construction_failure(
                type_key,
                "type has no default constructor",
            ));
        }
        let mut record = Record::new(type_key);
        for field in self.collect_fields(type_key)? {
            record.set(field.name, Value::Null);
        }
        Ok(record.into_ref())
    }

    fn same_identity(&self, a: &Record, b: &Record) -> bool {
        if a.type_key() != b.type_key() {
            return false;
        }
        let identity: Vec<String> = match self.types.get(a.type_key()) {
            Some(d) if !d.identity_fields.is_empty() => d.identity_fields.clone(),
            _ => match self.collect_fields(a.type_key()) {
                Ok(fields) => fields
                    .into_iter()
                    .filter(|f| !f.field_type.is_collection())
                    .map(|f| f.name)
                    .collect(),
                Err(_) => return false,
            },
        };
        identity.iter().all(|field| {
            let left = a.get(field).cloned().unwrap_or(Value::Null);
            let right = b.get(field).cloned().unwrap_or(Value::Null);
            left == right
        })
    }
}

impl TypeCatalog for TypeRegistry {
    fn discover(&self, namespace: &str) -> FilterResult<Vec<Access>> {
        let mut access: Vec<Access> = self
            .in_namespace(namespace)
            .filter(|d| d.target && !d.is_abstract && !d.ignored)
            .map(|d| self.default_access(d))
            .collect::<FilterResult<_>>()?;
        access.sort_by(|a, b| a.type_key.cmp(&b.type_key));
        Ok(access)
    }

    fn ignored_types(&self, namespace: &str) -> FilterResult<Vec<String>> {
        let mut ignored: Vec<String> = self
            .in_namespace(namespace)
            .filter(|d| d.ignored)
            .map(|d| d.type_key.clone())
            .collect();
        ignored.sort();
        Ok(ignored)
    }
}

/// Convenience for building fields of a descriptor.
pub fn field(name: &str, field_type: FieldType) -> FieldDescriptor {
    FieldDescriptor::new(name, field_type)
}
