use super::GroupRepository;
use crate::error::{FilterError, FilterResult};
use crate::permissions::types::policy::Group;
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use uuid::Uuid;

const GROUPS_TREE: &str = "security_groups";

/// Group repository backed by a sled tree, one JSON document per group keyed by id.
#[derive(Clone)]
pub struct SledGroupRepository {
    /// The underlying sled database instance
    db: sled::Db,
    groups_tree: sled::Tree,
    /// Returned by `bootstrap_groups` while the tree is empty
    seed_groups: Vec<Group>,
}

impl SledGroupRepository {
    /// Creates a repository over an open database, opening its tree.
    pub fn new(db: sled::Db) -> FilterResult<Self> {
        let groups_tree = db.open_tree(GROUPS_TREE)?;
        Ok(Self {
            db,
            groups_tree,
            seed_groups: Vec::new(),
        })
    }

    /// Opens (or creates) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> FilterResult<Self> {
        let db = sled::open(path.as_ref())?;
        Self::new(db)
    }

    /// Groups handed to the first reconciliation when nothing is stored yet.
    pub fn with_seed_groups(mut self, groups: Vec<Group>) -> Self {
        self.seed_groups = groups;
        self
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn store_in_tree<T: Serialize>(&self, key: &str, item: &T) -> FilterResult<()> {
        let bytes = serde_json::to_vec(item)
            .map_err(|e| FilterError::serialization("group", e.to_string()))?;

        self.groups_tree
            .insert(key.as_bytes(), bytes)
            .map_err(|e| FilterError::repository("insert", e.to_string()))?;

        // Ensure the data is durably written to disk
        self.groups_tree
            .flush()
            .map_err(|e| FilterError::repository("flush", e.to_string()))?;

        Ok(())
    }

    fn get_from_tree<T: DeserializeOwned>(&self, key: &str) -> FilterResult<Option<T>> {
        match self.groups_tree.get(key.as_bytes()) {
            Ok(Some(bytes)) => {
                let item = serde_json::from_slice(&bytes)
                    .map_err(|e| FilterError::serialization("group", e.to_string()))?;
                Ok(Some(item))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(FilterError::repository("retrieve", e.to_string())),
        }
    }

    fn list_items_in_tree<T: DeserializeOwned>(&self) -> FilterResult<Vec<(String, T)>> {
        let mut items = Vec::new();
        for result in self.groups_tree.iter() {
            let (key, value) =
                result.map_err(|e| FilterError::repository("iterate", e.to_string()))?;
            let key_str = String::from_utf8_lossy(&key).to_string();
            let item = serde_json::from_slice(&value).map_err(|e| {
                FilterError::serialization(format!("group '{}'", key_str), e.to_string())
            })?;
            items.push((key_str, item));
        }
        Ok(items)
    }
}

impl GroupRepository for SledGroupRepository {
    fn get_group(&self, id: &str) -> FilterResult<Option<Group>> {
        self.get_from_tree(id)
    }

    fn list_groups(&self) -> FilterResult<Vec<Group>> {
        let mut groups: Vec<Group> = self
            .list_items_in_tree::<Group>()?
            .into_iter()
            .map(|(id, mut group)| {
                group.id = Some(id);
                group
            })
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    fn bootstrap_groups(&self) -> FilterResult<Vec<Group>> {
        if self.groups_tree.is_empty() && !self.seed_groups.is_empty() {
            info!("Group store is empty, bootstrapping {} seed groups", self.seed_groups.len());
            return Ok(self.seed_groups.clone());
        }
        self.list_groups()
    }

    fn save_group(&self, group: &Group) -> FilterResult<String> {
        let id = group
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut stored = group.clone();
        stored.id = Some(id.clone());
        self.store_in_tree(&id, &stored)?;
        debug!("Saved group {} as {}", group.name, id);
        Ok(id)
    }

    fn delete_group(&self, id: &str) -> FilterResult<()> {
        self.groups_tree
            .remove(id.as_bytes())
            .map_err(|e| FilterError::repository("remove", e.to_string()))?;
        self.groups_tree
            .flush()
            .map_err(|e| FilterError::repository("flush", e.to_string()))?;
        info!("Deleted group {}", id);
        Ok(())
    }
}
