//! Keeps stored groups in step with the type catalog.
//!
//! Types and fields the catalog no longer knows are dropped, new ones are
//! added with their catalog defaults. Entries present on both sides follow
//! the catalog's lock flag: a locked entry is forced to the catalog level, an
//! unlocked one keeps whatever level the operator gave it. Display names
//! always come from the catalog.

use crate::permissions::types::policy::{Access, Group};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::mem;

/// What a reconciliation pass changed in one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub group: String,
    pub removed_types: Vec<String>,
    /// (type key, property name)
    pub removed_fields: Vec<(String, String)>,
    pub added_types: Vec<String>,
    /// (type key, property name)
    pub added_fields: Vec<(String, String)>,
    /// Locked types whose level was reset to the catalog value
    pub forced_types: Vec<String>,
    /// Locked fields whose level was reset to the catalog value
    pub forced_fields: Vec<(String, String)>,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconcileReport {
    fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            removed_types: Vec::new(),
            removed_fields: Vec::new(),
            added_types: Vec::new(),
            added_fields: Vec::new(),
            forced_types: Vec::new(),
            forced_fields: Vec::new(),
            reconciled_at: Utc::now(),
        }
    }

    /// True when no entry was added, removed or forced. Lock-flag-only syncs don't count.
    pub fn is_unchanged(&self) -> bool {
        self.removed_types.is_empty()
            && self.removed_fields.is_empty()
            && self.added_types.is_empty()
            && self.added_fields.is_empty()
            && self.forced_types.is_empty()
            && self.forced_fields.is_empty()
    }
}

/// Reconciles groups against a master access list, one entry per catalogued type.
#[derive(Debug, Clone)]
pub struct SchemaReconciler {
    catalog: Vec<Access>,
    index: HashMap<String, usize>,
}

impl SchemaReconciler {
    /// Later entries for the same type key replace earlier ones.
    pub fn new(catalog: Vec<Access>) -> Self {
        let mut entries: Vec<Access> = Vec::with_capacity(catalog.len());
        let mut index = HashMap::new();
        for access in catalog {
            match index.get(&access.type_key) {
                Some(&position) => entries[position] = access,
                None => {
                    index.insert(access.type_key.clone(), entries.len());
                    entries.push(access);
                }
            }
        }
        Self {
            catalog: entries,
            index,
        }
    }

    pub fn catalog(&self) -> &[Access] {
        &self.catalog
    }

    fn master(&self, type_key: &str) -> Option<&Access> {
        self.index.get(type_key).map(|&i| &self.catalog[i])
    }

    /// Brings one group in line with the catalog, in place.
    pub fn reconcile_group(&self, group: &mut Group) -> ReconcileReport {
        let group_name = group.name.clone();
        let mut report = ReconcileReport::new(&group_name);

        self.retire_types(group, &mut report);
        self.retire_fields(group, &mut report);

        for master in &self.catalog {
            match group.access_for_mut(&master.type_key) {
                Some(access) => {
                    access.display_name = master.display_name.clone();
                    if master.locked {
                        access.locked = true;
                        if access.level != master.level {
                            info!(
                                "Forcing access for type {} in group {} from {} to {}",
                                master.type_key, group_name, access.level, master.level
                            );
                            access.level = master.level;
                            report.forced_types.push(master.type_key.clone());
                        }
                    } else {
                        access.locked = false;
                    }
                }
                None => {
                    info!("Adding access for type {} to group {}", master.type_key, group_name);
                    group.access.push(master.clone());
                    report.added_types.push(master.type_key.clone());
                }
            }
        }

        for access in group.access.iter_mut() {
            if let Some(master) = self.master(&access.type_key) {
                Self::reconcile_permissions(access, master, &group_name, &mut report);
            }
        }
        report
    }

    fn retire_types(&self, group: &mut Group, report: &mut ReconcileReport) {
        let (kept, removed): (Vec<Access>, Vec<Access>) = mem::take(&mut group.access)
            .into_iter()
            .partition(|access| self.master(&access.type_key).is_some());
        for access in removed {
            info!(
                "Removing old access for type {} from group {}",
                access.type_key, group.name
            );
            report.removed_types.push(access.type_key);
        }
        group.access = kept;
    }

    fn retire_fields(&self, group: &mut Group, report: &mut ReconcileReport) {
        for access in group.access.iter_mut() {
            let Some(master) = self.master(&access.type_key) else {
                continue;
            };
            let (kept, removed): (Vec<_>, Vec<_>) = mem::take(&mut access.permissions)
                .into_iter()
                .partition(|p| master.permission(&p.property_name).is_some());
            for permission in removed {
                info!(
                    "Removing old permission for field {} on type {} in group {}",
                    permission.property_name, access.type_key, group.name
                );
                report
                    .removed_fields
                    .push((access.type_key.clone(), permission.property_name));
            }
            access.permissions = kept;
        }
    }

    fn reconcile_permissions(
        access: &mut Access,
        master: &Access,
        group_name: &str,
        report: &mut ReconcileReport,
    ) {
        let type_key = access.type_key.clone();
        for catalog_permission in &master.permissions {
            match access.permission_mut(&catalog_permission.property_name) {
                Some(permission) => {
                    permission.display_name = catalog_permission.display_name.clone();
                    if catalog_permission.locked {
                        permission.locked = true;
                        if permission.level != catalog_permission.level {
                            info!(
                                "Forcing permission for field {} on type {} in group {} to {}",
                                permission.property_name,
                                type_key,
                                group_name,
                                catalog_permission.level
                            );
                            permission.level = catalog_permission.level;
                            report.forced_fields.push((
                                type_key.clone(),
                                catalog_permission.property_name.clone(),
                            ));
                        }
                    } else {
                        permission.locked = false;
                    }
                }
                None => {
                    info!(
                        "Adding permission for field {} on type {} for group {}",
                        catalog_permission.property_name, type_key, group_name
                    );
                    access.permissions.push(catalog_permission.clone());
                    report.added_fields.push((
                        type_key.clone(),
                        catalog_permission.property_name.clone(),
                    ));
                }
            }
        }
    }
}
