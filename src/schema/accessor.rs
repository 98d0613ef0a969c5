use crate::error::FilterResult;
use crate::schema::field::{CollectionKind, FieldDescriptor};
use crate::schema::value::{Record, RecordRef, Value};

/// Field-level access to records of catalogued types.
///
/// The filter never inspects a record's shape on its own; it asks the
/// accessor which fields a type declares, reads and writes them by name and
/// has it construct blank instances to copy into.
pub trait PropertyAccessor: Send + Sync {
    /// All declared fields of the type, inherited ones included.
    fn fields(&self, type_key: &str) -> FilterResult<Vec<FieldDescriptor>>;

    /// A blank instance of the type.
    ///
    /// Fails with `ConstructionFailure` when the type has no usable default.
    fn new_instance(&self, type_key: &str) -> FilterResult<RecordRef>;

    /// Element equality used when matching incoming collection elements
    /// against stored ones. Only called for records of the same type.
    fn same_identity(&self, a: &Record, b: &Record) -> bool;

    fn get(&self, record: &Record, field: &str) -> Value {
        record.get(field).cloned().unwrap_or(Value::Null)
    }

    fn set(&self, record: &mut Record, field: &str, value: Value) {
        record.set(field, value);
    }

    fn new_collection(&self, kind: CollectionKind) -> Value {
        Value::collection(kind, Vec::new())
    }
}
