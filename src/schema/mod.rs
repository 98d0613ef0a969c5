pub mod accessor;
pub mod catalog;
pub mod field;
pub mod registry;
pub mod value;

pub use accessor::PropertyAccessor;
pub use catalog::{build_display_name, CatalogDefaults, TypeCatalog};
pub use field::{CollectionKind, FieldDescriptor, FieldType};
pub use registry::{TypeDescriptor, TypeRegistry};
pub use value::{Record, RecordRef, Value};
