//! Dynamic record values.
//!
//! Records are trees of scalars, nested records and homogeneous collections.
//! Nested records are held through [`RecordRef`], a shared handle whose
//! pointer address is the record's identity. The filter walks use that
//! identity to detect cycles and to keep shared sub-records shared.

use crate::error::{FilterError, FilterResult};
use crate::schema::field::CollectionKind;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A single field value.
///
/// Equality on `Record` is identity: two values are equal when they point at
/// the same record. Compare record contents field by field, or go through
/// [`PropertyAccessor::same_identity`](crate::schema::PropertyAccessor::same_identity).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Record(RecordRef),
    List(Vec<Value>),
    Set(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_record(&self) -> Option<&RecordRef> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Elements and kind when the value is a collection.
    pub fn as_collection(&self) -> Option<(CollectionKind, &[Value])> {
        match self {
            Value::List(items) => Some((CollectionKind::List, items)),
            Value::Set(items) => Some((CollectionKind::Set, items)),
            _ => None,
        }
    }

    pub fn as_collection_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Builds a collection value of the given kind.
    pub fn collection(kind: CollectionKind, items: Vec<Value>) -> Value {
        match kind {
            CollectionKind::List => Value::List(items),
            CollectionKind::Set => Value::Set(items),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<RecordRef> for Value {
    fn from(v: RecordRef) -> Self {
        Value::Record(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(RecordRef::new(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An instance of a catalogued type: its type key and named field values.
#[derive(Debug, Clone, Default)]
pub struct Record {
    type_key: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn into_ref(self) -> RecordRef {
        RecordRef::new(self)
    }
}

/// Shared, lock-guarded handle to a [`Record`].
#[derive(Clone)]
pub struct RecordRef(Arc<RwLock<Record>>);

impl RecordRef {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    pub fn read(&self) -> FilterResult<RwLockReadGuard<'_, Record>> {
        self.0.read().map_err(|_| FilterError::read_lock("record"))
    }

    pub fn write(&self) -> FilterResult<RwLockWriteGuard<'_, Record>> {
        self.0.write().map_err(|_| FilterError::write_lock("record"))
    }

    /// Identity of the underlying record, stable for the handle's lifetime.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn type_key(&self) -> FilterResult<String> {
        Ok(self.read()?.type_key().to_string())
    }

    /// Clone of a single field, `Null` when unset.
    pub fn get(&self, field: &str) -> FilterResult<Value> {
        Ok(self.read()?.get(field).cloned().unwrap_or(Value::Null))
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> FilterResult<()> {
        self.write()?.set(field, value);
        Ok(())
    }
}

impl fmt::Debug for RecordRef {
    // Records may form cycles; print the identity, not the contents.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(record) => write!(f, "RecordRef({}@{:#x})", record.type_key(), self.id()),
            Err(_) => write!(f, "RecordRef(<locked>@{:#x})", self.id()),
        }
    }
}

impl From<Record> for RecordRef {
    fn from(record: Record) -> Self {
        RecordRef::new(record)
    }
}
