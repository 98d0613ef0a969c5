//! # Filter Service
//!
//! Wires the filter engine to group persistence and the type catalog.
//!
//! On [`init`](FilterService::init) the service loads the stored groups,
//! reconciles each against the catalog of its configured namespaces, saves
//! them back and publishes them (plus the runtime groups and static user
//! bindings) as the new policy snapshot. Nothing is published when a save
//! fails. Group edits go through the same path so the snapshot always
//! reflects what was persisted.
//!
//! Group names are unique across stored and runtime groups, since the policy
//! snapshot and every user binding refer to groups by name.

pub mod reconciler;

use crate::config::ServiceConfig;
use crate::error::{FilterError, FilterResult};
use crate::filter::{PropertyFilter, Subject};
use crate::permissions::types::policy::{Access, Group};
use crate::persistence::{GroupRepository, PseudoRepository, SledGroupRepository};
use crate::schema::accessor::PropertyAccessor;
use crate::schema::catalog::TypeCatalog;
use crate::schema::registry::TypeRegistry;
use log::{debug, error, info};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub use reconciler::{ReconcileReport, SchemaReconciler};

/// Owns the group lifecycle around a [`PropertyFilter`].
///
/// Mutating operations take `&mut self`; reads go through the shared filter,
/// which may be cloned out with [`filter`](Self::filter) and used from any thread.
pub struct FilterService {
    filter: Arc<PropertyFilter>,
    repository: Box<dyn GroupRepository>,
    catalog: Arc<dyn TypeCatalog>,
    namespaces: Vec<String>,
    static_allocations: HashMap<String, String>,
    runtime_groups: Vec<Group>,
    /// Persisted groups as last published
    groups: Vec<Group>,
}

impl FilterService {
    pub fn builder(filter: Arc<PropertyFilter>, catalog: Arc<dyn TypeCatalog>) -> ServiceBuilder {
        ServiceBuilder::new(filter, catalog)
    }

    /// Builds the whole stack from configuration, using `registry` as both
    /// the property accessor and the type catalog.
    ///
    /// Groups are kept in sled when `storage_path` is set and not persisted otherwise.
    pub fn from_config(config: ServiceConfig, mut registry: TypeRegistry) -> FilterResult<Self> {
        config.validate()?;
        registry.set_defaults(config.catalog_defaults);
        let registry = Arc::new(registry);
        let accessor: Arc<dyn PropertyAccessor> = registry.clone();
        let catalog: Arc<dyn TypeCatalog> = registry;

        let filter = PropertyFilter::builder()
            .accessor(accessor)
            .config(config.filter.clone())
            .build()?;

        let repository: Box<dyn GroupRepository> = match &config.storage_path {
            Some(path) => {
                info!("Storing security groups in {}", path.display());
                Box::new(SledGroupRepository::open(path)?)
            }
            None => Box::new(PseudoRepository),
        };

        ServiceBuilder::new(Arc::new(filter), catalog)
            .with_repository(repository)
            .apply_config(&config)
            .build()
    }

    pub fn filter(&self) -> &Arc<PropertyFilter> {
        &self.filter
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Persisted groups as currently published, runtime groups excluded.
    pub fn published_groups(&self) -> &[Group] {
        &self.groups
    }

    /// First reconciliation after startup, over the repository's bootstrap groups.
    pub fn init(&mut self) -> FilterResult<Vec<ReconcileReport>> {
        info!("Initialising filter service for namespaces {:?}", self.namespaces);
        let groups = self.repository.bootstrap_groups()?;
        self.reconcile_and_publish(groups)
    }

    /// Reloads every stored group and reconciles it again.
    pub fn refresh(&mut self) -> FilterResult<Vec<ReconcileReport>> {
        let groups = self.repository.list_groups()?;
        self.reconcile_and_publish(groups)
    }

    /// Master access list over all configured namespaces, sorted by type key.
    pub fn master_catalog(&self) -> FilterResult<Vec<Access>> {
        let mut catalog: Vec<Access> = Vec::new();
        for namespace in &self.namespaces {
            for access in self.catalog.discover(namespace)? {
                match catalog.iter_mut().find(|a| a.type_key == access.type_key) {
                    Some(existing) => *existing = access,
                    None => catalog.push(access),
                }
            }
        }
        catalog.sort_by(|a, b| a.type_key.cmp(&b.type_key));
        Ok(catalog)
    }

    fn ignored_types(&self) -> FilterResult<Vec<String>> {
        let mut ignored = Vec::new();
        for namespace in &self.namespaces {
            ignored.extend(self.catalog.ignored_types(namespace)?);
        }
        Ok(ignored)
    }

    fn reconcile_and_publish(&mut self, mut groups: Vec<Group>) -> FilterResult<Vec<ReconcileReport>> {
        if let Some(name) = duplicate_name(groups.iter().chain(self.runtime_groups.iter())) {
            error!("Group name {} is used twice, policy snapshot left unchanged", name);
            return Err(FilterError::InvalidArgument(format!(
                "Duplicate group name {}",
                name
            )));
        }
        let reconciler = SchemaReconciler::new(self.master_catalog()?);
        let ignored = self.ignored_types()?;
        info!(
            "Reconciling {} groups against {} catalogued types",
            groups.len(),
            reconciler.catalog().len()
        );

        let reports: Vec<ReconcileReport> = groups
            .iter_mut()
            .map(|group| reconciler.reconcile_group(group))
            .collect();

        for group in groups.iter_mut() {
            let id = self.repository.save_group(group).map_err(|e| {
                error!(
                    "Failed to save group {}, policy snapshot left unchanged: {}",
                    group.name, e
                );
                e
            })?;
            group.id = Some(id);
        }

        for type_key in ignored {
            if self.filter.add_opaque_type(&type_key)? {
                debug!("Copying ignored type {} by value", type_key);
            }
        }

        self.publish(groups)?;
        Ok(reports)
    }

    fn publish(&mut self, groups: Vec<Group>) -> FilterResult<()> {
        let mut snapshot = groups.clone();
        snapshot.extend(self.runtime_groups.iter().cloned());
        self.filter
            .store()
            .replace_with_overrides(&snapshot, &self.static_allocations)?;
        self.groups = groups;
        Ok(())
    }

    pub fn has_read_access(&self, type_or_display: &str, subject: Subject<'_>) -> bool {
        self.filter.has_read_access(type_or_display, subject)
    }

    pub fn has_write_access(&self, type_or_display: &str, subject: Subject<'_>) -> bool {
        self.filter.has_write_access(type_or_display, subject)
    }

    pub fn group_membership(&self) -> FilterResult<BTreeMap<String, Vec<String>>> {
        self.filter.group_membership()
    }

    // ========== Group administration ==========

    pub fn get_group(&self, id: &str) -> FilterResult<Option<Group>> {
        self.repository.get_group(id)
    }

    pub fn get_groups(&self) -> FilterResult<Vec<Group>> {
        self.repository.list_groups()
    }

    /// Reconciles, stores and republishes a group, returning its id.
    ///
    /// Locked catalog entries are restored, so an edit can only change what
    /// the catalog leaves open.
    pub fn save_group(&mut self, mut group: Group) -> FilterResult<String> {
        if group.name.trim().is_empty() {
            return Err(FilterError::InvalidArgument("Blank group name".to_string()));
        }
        let taken_by_other = self
            .groups
            .iter()
            .any(|g| g.name == group.name && g.id != group.id)
            || self.runtime_groups.iter().any(|g| g.name == group.name);
        if taken_by_other {
            return Err(FilterError::InvalidArgument(format!(
                "Group name {} is already in use",
                group.name
            )));
        }
        let reconciler = SchemaReconciler::new(self.master_catalog()?);
        let report = reconciler.reconcile_group(&mut group);
        if !report.is_unchanged() {
            info!("Group {} was adjusted to the catalog before saving", group.name);
        }

        let id = self.repository.save_group(&group)?;
        group.id = Some(id.clone());

        let mut groups = self.groups.clone();
        match groups.iter_mut().find(|g| g.id.as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = group,
            None => groups.push(group),
        }
        self.publish(groups)?;
        info!("Saved and published group {}", id);
        Ok(id)
    }

    /// Deletes a group and republishes without it.
    pub fn delete_group(&mut self, id: &str) -> FilterResult<()> {
        self.repository.delete_group(id)?;
        let groups: Vec<Group> = self
            .groups
            .iter()
            .filter(|g| g.id.as_deref() != Some(id))
            .cloned()
            .collect();
        self.publish(groups)
    }
}

/// Builder for [`FilterService`].
pub struct ServiceBuilder {
    filter: Arc<PropertyFilter>,
    catalog: Arc<dyn TypeCatalog>,
    repository: Box<dyn GroupRepository>,
    namespaces: Vec<String>,
    static_allocations: HashMap<String, String>,
    runtime_groups: Vec<Group>,
}

impl ServiceBuilder {
    pub fn new(filter: Arc<PropertyFilter>, catalog: Arc<dyn TypeCatalog>) -> Self {
        Self {
            filter,
            catalog,
            repository: Box::new(PseudoRepository),
            namespaces: Vec::new(),
            static_allocations: HashMap::new(),
            runtime_groups: Vec::new(),
        }
    }

    pub fn with_repository(mut self, repository: Box<dyn GroupRepository>) -> Self {
        self.repository = repository;
        self
    }

    pub fn add_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !self.namespaces.contains(&namespace) {
            self.namespaces.push(namespace);
        }
        self
    }

    /// Binds a user to a group regardless of group membership.
    pub fn add_static_group_allocation(
        mut self,
        username: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        self.static_allocations.insert(username.into(), group.into());
        self
    }

    pub fn add_static_group_allocations(mut self, allocations: HashMap<String, String>) -> Self {
        self.static_allocations.extend(allocations);
        self
    }

    /// A group published with every snapshot but never reconciled or persisted.
    pub fn add_runtime_group(mut self, group: Group) -> Self {
        self.runtime_groups.push(group);
        self
    }

    pub fn add_runtime_groups(mut self, groups: impl IntoIterator<Item = Group>) -> Self {
        self.runtime_groups.extend(groups);
        self
    }

    /// Namespaces, static allocations and runtime groups from a config.
    pub fn apply_config(mut self, config: &ServiceConfig) -> Self {
        for namespace in &config.namespaces {
            self = self.add_namespace(namespace.clone());
        }
        self.add_static_group_allocations(config.static_group_allocations.clone())
            .add_runtime_groups(config.runtime_groups.iter().cloned())
    }

    pub fn build(self) -> FilterResult<FilterService> {
        if self.namespaces.is_empty() {
            return Err(FilterError::Config(
                "No namespaces specified to scan".to_string(),
            ));
        }
        if let Some(name) = duplicate_name(self.runtime_groups.iter()) {
            return Err(FilterError::Config(format!(
                "Runtime group name {} is used twice",
                name
            )));
        }
        Ok(FilterService {
            filter: self.filter,
            repository: self.repository,
            catalog: self.catalog,
            namespaces: self.namespaces,
            static_allocations: self.static_allocations,
            runtime_groups: self.runtime_groups,
            groups: Vec::new(),
        })
    }
}

/// First group name that appears more than once.
fn duplicate_name<'g>(groups: impl Iterator<Item = &'g Group>) -> Option<&'g str> {
    let mut seen = HashSet::new();
    groups
        .map(|g| g.name.as_str())
        .find(|name| !seen.insert(*name))
}
