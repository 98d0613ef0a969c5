//! Group persistence boundary.
//!
//! The reconciler loads groups through [`GroupRepository`], rewrites them
//! against the type catalog and saves them back. [`PseudoRepository`] is the
//! default for callers with no persistence tier; [`SledGroupRepository`]
//! keeps groups in a sled tree.

pub mod sled_repository;

use crate::error::FilterResult;
use crate::permissions::types::policy::Group;

pub use sled_repository::SledGroupRepository;

/// Load, save and delete security groups.
pub trait GroupRepository: Send + Sync {
    fn get_group(&self, id: &str) -> FilterResult<Option<Group>>;

    fn list_groups(&self) -> FilterResult<Vec<Group>>;

    /// Groups to reconcile on the first run after startup.
    fn bootstrap_groups(&self) -> FilterResult<Vec<Group>>;

    /// Stores the group and returns its id, assigning one if the group has none.
    fn save_group(&self, group: &Group) -> FilterResult<String>;

    fn delete_group(&self, id: &str) -> FilterResult<()>;
}

/// Does nothing: always empty, saves and deletes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct PseudoRepository;

impl GroupRepository for PseudoRepository {
    fn get_group(&self, _id: &str) -> FilterResult<Option<Group>> {
        Ok(None)
    }

    fn list_groups(&self) -> FilterResult<Vec<Group>> {
        Ok(Vec::new())
    }

    fn bootstrap_groups(&self) -> FilterResult<Vec<Group>> {
        Ok(Vec::new())
    }

    fn save_group(&self, group: &Group) -> FilterResult<String> {
        Ok(group.id.clone().unwrap_or_else(|| group.name.clone()))
    }

    fn delete_group(&self, _id: &str) -> FilterResult<()> {
        Ok(())
    }
}
