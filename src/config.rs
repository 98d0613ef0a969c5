use crate::error::{FilterError, FilterResult};
use crate::permissions::types::policy::Group;
use crate::schema::catalog::CatalogDefaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Behaviour switches for the filter engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Filter each element of collection fields on read
    #[serde(default = "default_true")]
    pub filter_collections_on_load: bool,
    /// Recurse into nested record fields on read
    #[serde(default = "default_true")]
    pub filter_relations_on_load: bool,
    /// Reconcile collection fields element by element on save
    #[serde(default = "default_true")]
    pub filter_collections_on_save: bool,
    /// Merge nested record fields recursively on save
    #[serde(default = "default_true")]
    pub filter_relations_on_save: bool,
    /// Fail on declared fields that have no permission entry. When off such
    /// fields are readable and writable.
    #[serde(default = "default_true")]
    pub strict_permissions: bool,
    /// Type keys copied by value, added to the built-in leaf types
    #[serde(default)]
    pub opaque_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_collections_on_load: true,
            filter_relations_on_load: true,
            filter_collections_on_save: true,
            filter_relations_on_save: true,
            strict_permissions: true,
            opaque_types: Vec::new(),
        }
    }
}

impl FilterConfig {
    /// Configuration treating fields without permission entries as open.
    pub fn lenient() -> Self {
        Self {
            strict_permissions: false,
            ..Default::default()
        }
    }
}

/// Startup configuration for the filter service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Catalog namespaces whose types are reconciled into every group
    pub namespaces: Vec<String>,
    /// Username -> group bindings applied on top of group membership
    #[serde(default)]
    pub static_group_allocations: HashMap<String, String>,
    /// Groups published with the snapshot but never persisted
    #[serde(default)]
    pub runtime_groups: Vec<Group>,
    /// Levels for unmarked catalog entries
    #[serde(default)]
    pub catalog_defaults: CatalogDefaults,
    /// Sled database path for group persistence; nothing is persisted when absent
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl ServiceConfig {
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespaces: namespaces.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> FilterResult<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON document.
    pub fn from_json_str(content: &str) -> FilterResult<Self> {
        let config: ServiceConfig = serde_json::from_str(content)
            .map_err(|e| FilterError::Config(format!("Invalid JSON configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a `.json` file as JSON and anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> FilterResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FilterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn validate(&self) -> FilterResult<()> {
        if self.namespaces.is_empty() {
            return Err(FilterError::Config(
                "No namespaces specified to scan".to_string(),
            ));
        }
        if let Some(blank) = self.namespaces.iter().find(|n| n.trim().is_empty()) {
            return Err(FilterError::Config(format!("Blank namespace '{}'", blank)));
        }
        for (username, group) in &self.static_group_allocations {
            if username.trim().is_empty() || group.trim().is_empty() {
                return Err(FilterError::Config(format!(
                    "Static allocation '{}' -> '{}' has a blank side",
                    username, group
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::types::policy::{AccessLevel, PermissionLevel};
    use tempfile::tempdir;

    #[test]
    fn toml_config_fills_in_defaults() {
        let config = ServiceConfig::from_toml_str(
            r#"
            namespaces = ["billing"]

            [static_group_allocations]
            system = "Admins"

            [catalog_defaults]
            access = "READ"

            [filter]
            strict_permissions = false
            opaque_types = ["billing.Money"]
            "#,
        )
        .unwrap();
        assert_eq!(config.namespaces, vec!["billing"]);
        assert_eq!(config.static_group_allocations["system"], "Admins");
        assert_eq!(config.catalog_defaults.access, AccessLevel::Read);
        assert_eq!(config.catalog_defaults.permission, PermissionLevel::NoAccess);
        assert!(!config.filter.strict_permissions);
        assert!(config.filter.filter_collections_on_save);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn missing_namespaces_are_rejected() {
        let err = ServiceConfig::from_json_str(r#"{"namespaces": []}"#).unwrap_err();
        assert!(matches!(err, FilterError::Config(_)));
    }

    #[test]
    fn files_are_read_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.json");
        fs::write(
            &path,
            r#"{"namespaces": ["billing"], "runtime_groups": [{"name": "Admins"}]}"#,
        )
        .unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.runtime_groups[0].name, "Admins");
    }
}
