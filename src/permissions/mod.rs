// permissions module

pub mod policy_store;
pub mod types;
pub use policy_store::PolicyStore;
pub use types::policy::{Access, AccessLevel, Group, Permission, PermissionLevel};
