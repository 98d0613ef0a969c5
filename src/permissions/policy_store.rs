use crate::error::{FilterError, FilterResult};
use crate::permissions::types::policy::{Access, AccessLevel, Group, Permission, PermissionLevel};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The indexed policy every filter call reads from.
///
/// Built in full by [`PolicySnapshot::build`] and swapped in as a unit, so
/// readers never observe a half-applied group list.
#[derive(Debug, Default, Clone)]
struct PolicySnapshot {
    /// group name -> type key -> access
    groups: HashMap<String, HashMap<String, Access>>,
    /// upper-cased username -> group name
    user_groups: HashMap<String, String>,
    /// display name -> type key
    display_to_type: HashMap<String, String>,
    /// type key -> display name
    type_to_display: HashMap<String, String>,
}

impl PolicySnapshot {
    fn build(groups: &[Group], overrides: &HashMap<String, String>) -> Self {
        let mut snapshot = PolicySnapshot::default();
        for group in groups {
            let mut access_map = HashMap::with_capacity(group.access.len());
            for access in &group.access {
                snapshot.link_display_name(access.effective_display_name(), &access.type_key);
                access_map.insert(access.type_key.clone(), access.clone());
            }
            snapshot.groups.insert(group.name.clone(), access_map);
            for member in &group.members {
                snapshot
                    .user_groups
                    .insert(member.to_uppercase(), group.name.clone());
            }
        }
        for (username, group) in overrides {
            snapshot
                .user_groups
                .insert(username.to_uppercase(), group.clone());
        }
        snapshot
    }

    /// Keeps both directions consistent. On collision the most recent pair wins
    /// and whatever the display name or type key was paired with before is unlinked.
    fn link_display_name(&mut self, display_name: &str, type_key: &str) {
        if let Some(previous_type) = self.display_to_type.remove(display_name) {
            self.type_to_display.remove(&previous_type);
        }
        if let Some(previous_display) = self.type_to_display.remove(type_key) {
            self.display_to_type.remove(&previous_display);
        }
        self.display_to_type
            .insert(display_name.to_string(), type_key.to_string());
        self.type_to_display
            .insert(type_key.to_string(), display_name.to_string());
    }

    fn group(&self, group_name: &str) -> FilterResult<&HashMap<String, Access>> {
        self.groups
            .get(group_name)
            .ok_or_else(|| FilterError::group_not_found(group_name))
    }

    fn access(&self, type_or_display: &str, group_name: &str) -> FilterResult<&Access> {
        let access_map = self.group(group_name)?;
        access_map
            .get(type_or_display)
            .or_else(|| {
                self.display_to_type
                    .get(type_or_display)
                    .and_then(|type_key| access_map.get(type_key))
            })
            .ok_or_else(|| FilterError::access_not_defined(group_name, type_or_display))
    }
}

/// Concurrency-safe holder of the current permission snapshot.
///
/// Every query takes the shared lock and hands back owned copies. `replace`
/// takes the exclusive lock and swaps a fully built snapshot in.
#[derive(Debug, Default)]
pub struct PolicyStore {
    snapshot: RwLock<PolicySnapshot>,
}

impl PolicyStore {
    /// Creates an empty store; every group lookup fails until `replace` is called.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> FilterResult<RwLockReadGuard<'_, PolicySnapshot>> {
        self.snapshot
            .read()
            .map_err(|_| FilterError::read_lock("policy snapshot"))
    }

    fn write(&self) -> FilterResult<RwLockWriteGuard<'_, PolicySnapshot>> {
        self.snapshot
            .write()
            .map_err(|_| FilterError::write_lock("policy snapshot"))
    }

    /// Rebuilds the group table, the user index and the display-name index from scratch.
    pub fn replace(&self, groups: &[Group]) -> FilterResult<()> {
        self.replace_with_overrides(groups, &HashMap::new())
    }

    /// Same as [`replace`](Self::replace), with extra username -> group bindings
    /// applied on top of group membership inside the same swap.
    pub fn replace_with_overrides(
        &self,
        groups: &[Group],
        overrides: &HashMap<String, String>,
    ) -> FilterResult<()> {
        let fresh = PolicySnapshot::build(groups, overrides);
        let user_count = fresh.user_groups.len();
        *self.write()? = fresh;
        info!(
            "Policy snapshot replaced with {} groups and {} user bindings",
            groups.len(),
            user_count
        );
        Ok(())
    }

    /// Returns the group bound to `username`, compared case-insensitively.
    pub fn resolve_group(&self, username: &str) -> FilterResult<String> {
        self.read()?
            .user_groups
            .get(&username.to_uppercase())
            .cloned()
            .ok_or_else(|| FilterError::no_group_assigned(username))
    }

    /// Looks the access up by type key, then by display name.
    pub fn get_access(&self, type_or_display: &str, group_name: &str) -> FilterResult<Access> {
        self.read()?.access(type_or_display, group_name).cloned()
    }

    /// Access level only, without copying the permission list.
    pub fn access_level(&self, type_or_display: &str, group_name: &str) -> FilterResult<AccessLevel> {
        Ok(self.read()?.access(type_or_display, group_name)?.level)
    }

    /// Type keys the group may at least read, sorted.
    pub fn accessible_types(&self, group_name: &str) -> FilterResult<Vec<String>> {
        let snapshot = self.read()?;
        let mut types: Vec<String> = snapshot
            .group(group_name)?
            .iter()
            .filter(|(_, access)| access.level != AccessLevel::NoAccess)
            .map(|(type_key, _)| type_key.clone())
            .collect();
        types.sort();
        Ok(types)
    }

    /// Permissions on the type the group may at least read, as independent copies.
    pub fn accessible_fields(
        &self,
        type_or_display: &str,
        group_name: &str,
    ) -> FilterResult<Vec<Permission>> {
        let snapshot = self.read()?;
        let access = snapshot.access(type_or_display, group_name)?;
        Ok(access
            .permissions
            .iter()
            .filter(|p| p.level != PermissionLevel::NoAccess)
            .cloned()
            .collect())
    }

    /// Binds a user to a group, returning the previous binding if there was one.
    pub fn bind_user(&self, username: &str, group_name: &str) -> FilterResult<Option<String>> {
        debug!("Binding user {} to group {}", username, group_name);
        Ok(self
            .write()?
            .user_groups
            .insert(username.to_uppercase(), group_name.to_string()))
    }

    /// Removes a user's binding, returning the group it pointed at.
    pub fn unbind_user(&self, username: &str) -> FilterResult<Option<String>> {
        debug!("Unbinding user {}", username);
        Ok(self.write()?.user_groups.remove(&username.to_uppercase()))
    }

    /// Copy of the full upper-cased username -> group index.
    pub fn user_group_index(&self) -> FilterResult<HashMap<String, String>> {
        Ok(self.read()?.user_groups.clone())
    }

    /// Group name -> sorted usernames bound to it.
    pub fn group_membership(&self) -> FilterResult<BTreeMap<String, Vec<String>>> {
        let snapshot = self.read()?;
        let mut membership: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (username, group) in &snapshot.user_groups {
            membership
                .entry(group.clone())
                .or_default()
                .push(username.clone());
        }
        for users in membership.values_mut() {
            users.sort();
        }
        Ok(membership)
    }

    /// Names of all groups in the snapshot, sorted.
    pub fn group_names(&self) -> FilterResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.groups.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// The type key a display name currently resolves to.
    pub fn type_for_display_name(&self, display_name: &str) -> FilterResult<Option<String>> {
        Ok(self.read()?.display_to_type.get(display_name).cloned())
    }

    /// The display name a type key is currently indexed under.
    pub fn display_name_for_type(&self, type_key: &str) -> FilterResult<Option<String>> {
        Ok(self.read()?.type_to_display.get(type_key).cloned())
    }
}
