//! # Property Filter
//!
//! The filter copies records between what is stored and what a user sees or
//! submits, dropping everything the user's group may not touch.
//!
//! - Reading builds a fresh instance and copies over readable fields,
//!   recursing into nested records and collections. A type the group has no
//!   access to comes back as `None`, which empties the parent's field.
//! - Saving merges writable fields of an incoming record onto the stored one.
//!   Collections are rebuilt from the incoming elements, each matched against
//!   the stored collection and merged on its own.
//!
//! Both walks are synchronous and keep a map keyed by record identity, so
//! cyclic or shared sub-records are visited once.

mod read;
mod save;

use crate::config::FilterConfig;
use crate::error::{FilterError, FilterResult};
use crate::permissions::policy_store::PolicyStore;
use crate::permissions::types::policy::{Access, AccessLevel, Group, Permission, PermissionLevel};
use crate::schema::accessor::PropertyAccessor;
use crate::schema::value::RecordRef;
use log::{debug, warn};
use once_cell::sync::Lazy;
use read::ReadWalk;
use save::SaveWalk;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Leaf types every filter copies by value.
static LEAF_TYPES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "string", "text", "char", "bool", "boolean", "byte", "short", "int", "integer", "long",
        "float", "double", "decimal", "bigint", "bigdecimal", "date", "datetime", "timestamp",
        "uuid", "bytes",
    ]
    .into_iter()
    .collect()
});

/// Who a request is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    /// A username, resolved to its group through the policy store
    User(&'a str),
    /// A group name, used as is
    Group(&'a str),
}

impl fmt::Display for Subject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(name) => write!(f, "user {}", name),
            Subject::Group(name) => write!(f, "group {}", name),
        }
    }
}

/// A save the group's type-level access does not allow.
#[derive(Error, Debug, Clone)]
#[error("Group {group} has {level} access to {type_key} and may not save it")]
pub struct Denial {
    pub type_key: String,
    pub group: String,
    pub level: AccessLevel,
    /// The stored record, untouched
    pub existing: Option<RecordRef>,
}

/// Result of [`PropertyFilter::filter_for_save`].
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// The stored record (or a fresh instance) with the writable fields merged in
    Merged(RecordRef),
    Denied(Denial),
}

impl SaveOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, SaveOutcome::Denied(_))
    }

    /// Treats a denial as an error.
    pub fn into_result(self) -> Result<RecordRef, Denial> {
        match self {
            SaveOutcome::Merged(record) => Ok(record),
            SaveOutcome::Denied(denial) => Err(denial),
        }
    }

    /// Treats a denial as a silent no-op: the stored record comes back unchanged.
    pub fn into_merged_or_existing(self) -> Option<RecordRef> {
        match self {
            SaveOutcome::Merged(record) => Some(record),
            SaveOutcome::Denied(denial) => denial.existing,
        }
    }
}

/// Filter engine: read filtering, save merging and the policy queries around them.
pub struct PropertyFilter {
    store: Arc<PolicyStore>,
    accessor: Arc<dyn PropertyAccessor>,
    opaque_types: RwLock<HashSet<String>>,
    config: FilterConfig,
}

impl PropertyFilter {
    pub fn builder() -> PropertyFilterBuilder {
        PropertyFilterBuilder::default()
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    pub fn accessor(&self) -> &Arc<dyn PropertyAccessor> {
        &self.accessor
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Registers a type to be copied by value without filtering.
    pub fn add_opaque_type(&self, type_key: &str) -> FilterResult<bool> {
        let mut opaque = self
            .opaque_types
            .write()
            .map_err(|_| FilterError::write_lock("opaque types"))?;
        Ok(opaque.insert(type_key.to_string()))
    }

    pub fn is_opaque_type(&self, type_key: &str) -> FilterResult<bool> {
        Ok(self.opaque_snapshot()?.contains(type_key))
    }

    fn opaque_snapshot(&self) -> FilterResult<HashSet<String>> {
        self.opaque_types
            .read()
            .map(|set| set.clone())
            .map_err(|_| FilterError::read_lock("opaque types"))
    }

    /// The group a subject acts as.
    pub fn resolve(&self, subject: Subject<'_>) -> FilterResult<String> {
        match subject {
            Subject::User(username) if username.trim().is_empty() => {
                Err(FilterError::InvalidArgument("Blank username".to_string()))
            }
            Subject::Group(group) if group.trim().is_empty() => {
                Err(FilterError::InvalidArgument("Blank group name".to_string()))
            }
            Subject::User(username) => self.store.resolve_group(username),
            Subject::Group(group) => Ok(group.to_string()),
        }
    }

    /// Level of a field under the access, applying the missing-permission policy.
    fn field_level(&self, access: &Access, field: &str) -> FilterResult<PermissionLevel> {
        match access.permission(field) {
            Some(permission) => Ok(permission.level),
            None if self.config.strict_permissions => {
                warn!(
                    "No permission defined for field {} on type {}",
                    field, access.type_key
                );
                Err(FilterError::permission_not_defined(&access.type_key, field))
            }
            None => Ok(PermissionLevel::Write),
        }
    }

    // ========== Policy store delegation ==========

    pub fn replace_policy(&self, groups: &[Group]) -> FilterResult<()> {
        self.store.replace(groups)
    }

    pub fn bind_user(&self, username: &str, group: &str) -> FilterResult<Option<String>> {
        self.store.bind_user(username, group)
    }

    pub fn unbind_user(&self, username: &str) -> FilterResult<Option<String>> {
        self.store.unbind_user(username)
    }

    pub fn user_group_index(&self) -> FilterResult<HashMap<String, String>> {
        self.store.user_group_index()
    }

    pub fn group_membership(&self) -> FilterResult<BTreeMap<String, Vec<String>>> {
        self.store.group_membership()
    }

    pub fn get_access(&self, type_or_display: &str, subject: Subject<'_>) -> FilterResult<Access> {
        let group = self.resolve(subject)?;
        self.store.get_access(type_or_display, &group)
    }

    pub fn accessible_types(&self, subject: Subject<'_>) -> FilterResult<Vec<String>> {
        let group = self.resolve(subject)?;
        self.store.accessible_types(&group)
    }

    pub fn accessible_fields(
        &self,
        type_or_display: &str,
        subject: Subject<'_>,
    ) -> FilterResult<Vec<Permission>> {
        let group = self.resolve(subject)?;
        self.store.accessible_fields(type_or_display, &group)
    }

    /// Whether the subject may see records of the type. Unknown users, groups
    /// and types answer `false`.
    pub fn has_read_access(&self, type_or_display: &str, subject: Subject<'_>) -> bool {
        self.check_level(type_or_display, subject, AccessLevel::can_read)
    }

    /// Whether the subject may save records of the type. Unknown users, groups
    /// and types answer `false`.
    pub fn has_write_access(&self, type_or_display: &str, subject: Subject<'_>) -> bool {
        self.check_level(type_or_display, subject, AccessLevel::can_write)
    }

    fn check_level(
        &self,
        type_or_display: &str,
        subject: Subject<'_>,
        allowed: fn(AccessLevel) -> bool,
    ) -> bool {
        let level = self
            .resolve(subject)
            .and_then(|group| self.store.access_level(type_or_display, &group));
        match level {
            Ok(level) => allowed(level),
            Err(e) if e.is_policy_miss() => {
                debug!("No access for {} on {}: {}", subject, type_or_display, e);
                false
            }
            Err(e) => {
                warn!("Access check for {} on {} failed: {}", subject, type_or_display, e);
                false
            }
        }
    }

    // ========== Filtering ==========

    /// Permission-filtered copy of `record` for presentation to `subject`.
    ///
    /// Returns `None` when the subject's group has no access to the record's
    /// type. The source record is never modified.
    pub fn filter_for_read(
        &self,
        record: &RecordRef,
        subject: Subject<'_>,
    ) -> FilterResult<Option<RecordRef>> {
        let group = self.resolve(subject)?;
        let mut walk = ReadWalk::new(self, &group, self.opaque_snapshot()?);
        walk.record(record)
    }

    /// Merges the writable fields of `incoming` onto `existing`.
    ///
    /// When `existing` is `None` a fresh instance of the incoming type is the
    /// merge target. `existing` is mutated in place; callers must not share it
    /// with a concurrent save. When the walk fails part way, every field it
    /// already wrote is restored before the error is returned.
    pub fn filter_for_save(
        &self,
        incoming: &RecordRef,
        existing: Option<&RecordRef>,
        subject: Subject<'_>,
    ) -> FilterResult<SaveOutcome> {
        let group = self.resolve(subject)?;
        let mut walk = SaveWalk::new(self, &group, self.opaque_snapshot()?);
        let outcome = match walk.record(incoming, existing.cloned()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Save for {} failed, restoring stored records: {}", subject, e);
                walk.rollback()?;
                return Err(e);
            }
        };
        if let SaveOutcome::Denied(denial) = &outcome {
            warn!("Save denied for {}: {}", subject, denial);
        }
        Ok(outcome)
    }
}

/// Builder for [`PropertyFilter`].
#[derive(Default)]
pub struct PropertyFilterBuilder {
    store: Option<Arc<PolicyStore>>,
    accessor: Option<Arc<dyn PropertyAccessor>>,
    extra_opaque: Vec<String>,
    config: FilterConfig,
}

impl PropertyFilterBuilder {
    pub fn accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Shares an existing store; a fresh empty one is created otherwise.
    pub fn store(mut self, store: Arc<PolicyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: FilterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_opaque_type(mut self, type_key: impl Into<String>) -> Self {
        let type_key = type_key.into();
        if !self.extra_opaque.contains(&type_key) {
            self.extra_opaque.push(type_key);
        }
        self
    }

    pub fn filter_collections_on_load(mut self, filter: bool) -> Self {
        self.config.filter_collections_on_load = filter;
        self
    }

    pub fn filter_relations_on_load(mut self, filter: bool) -> Self {
        self.config.filter_relations_on_load = filter;
        self
    }

    pub fn filter_collections_on_save(mut self, filter: bool) -> Self {
        self.config.filter_collections_on_save = filter;
        self
    }

    pub fn filter_relations_on_save(mut self, filter: bool) -> Self {
        self.config.filter_relations_on_save = filter;
        self
    }

    pub fn strict_permissions(mut self, strict: bool) -> Self {
        self.config.strict_permissions = strict;
        self
    }

    pub fn build(self) -> FilterResult<PropertyFilter> {
        let accessor = self.accessor.ok_or_else(|| {
            FilterError::InvalidArgument("PropertyFilter needs a property accessor".to_string())
        })?;
        let mut opaque: HashSet<String> = LEAF_TYPES.iter().map(|t| t.to_string()).collect();
        opaque.extend(self.config.opaque_types.iter().cloned());
        opaque.extend(self.extra_opaque);
        Ok(PropertyFilter {
            store: self.store.unwrap_or_default(),
            accessor,
            opaque_types: RwLock::new(opaque),
            config: self.config,
        })
    }
}
