//! # Property Filter
//!
//! Field-level authorization for record trees. Users belong to security
//! groups; each group grants a level per record type and per field. The
//! filter hands out permission-filtered copies of stored records and merges
//! user-submitted records back onto stored ones, touching only what the
//! group may write.
//!
//! ## Core Components
//!
//! * `schema` - Record values, type descriptors, the property accessor and the type catalog
//! * `permissions` - Group, access and permission types plus the policy store
//! * `filter` - Read filtering and save merging
//! * `persistence` - Group repositories (no-op and sled)
//! * `service` - Catalog reconciliation and the group lifecycle
//! * `config` - Filter switches and service configuration
//! * `error` - Error types and handling

pub mod config;
pub mod error;
pub mod filter;
pub mod permissions;
pub mod persistence;
pub mod schema;
pub mod service;

// Re-export main types for convenience
pub use config::{FilterConfig, ServiceConfig};
pub use error::{FilterError, FilterResult};
pub use filter::{Denial, PropertyFilter, PropertyFilterBuilder, SaveOutcome, Subject};
pub use permissions::policy_store::PolicyStore;
pub use permissions::types::policy::{Access, AccessLevel, Group, Permission, PermissionLevel};
pub use persistence::{GroupRepository, PseudoRepository, SledGroupRepository};
pub use schema::accessor::PropertyAccessor;
pub use schema::catalog::{CatalogDefaults, TypeCatalog};
pub use schema::field::{CollectionKind, FieldDescriptor, FieldType};
pub use schema::registry::{TypeDescriptor, TypeRegistry};
pub use schema::value::{Record, RecordRef, Value};
pub use service::{FilterService, ReconcileReport, SchemaReconciler, ServiceBuilder};
