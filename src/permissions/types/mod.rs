pub mod policy;

pub use policy::{Access, AccessLevel, Group, Permission, PermissionLevel};
