use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Type-level grant a group holds on a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    NoAccess,
    Read,
    Create,
    Update,
}

impl AccessLevel {
    /// Whether records of the type may be seen at all.
    pub fn can_read(self) -> bool {
        self != AccessLevel::NoAccess
    }

    /// Whether a save may merge into records of the type.
    ///
    /// Create and Update are treated alike by the merge.
    pub fn can_write(self) -> bool {
        matches!(self, AccessLevel::Create | AccessLevel::Update)
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::NoAccess
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::NoAccess => write!(f, "NO_ACCESS"),
            AccessLevel::Read => write!(f, "READ"),
            AccessLevel::Create => write!(f, "CREATE"),
            AccessLevel::Update => write!(f, "UPDATE"),
        }
    }
}

/// Field-level grant a group holds on one property of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    NoAccess,
    Read,
    Write,
}

impl PermissionLevel {
    pub fn can_read(self) -> bool {
        self != PermissionLevel::NoAccess
    }

    pub fn can_write(self) -> bool {
        self == PermissionLevel::Write
    }
}

impl Default for PermissionLevel {
    fn default() -> Self {
        PermissionLevel::NoAccess
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::NoAccess => write!(f, "NO_ACCESS"),
            PermissionLevel::Read => write!(f, "READ"),
            PermissionLevel::Write => write!(f, "WRITE"),
        }
    }
}

/// A group's grant on a single property, keyed by `property_name` within its [`Access`].
///
/// `locked` marks a grant derived from a field-level marker in the type
/// catalog. Reconciliation forces locked grants back to the catalog value and
/// leaves the level of unlocked grants to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub property_name: String,
    #[serde(default)]
    pub display_name: String,
    pub level: PermissionLevel,
    #[serde(default)]
    pub locked: bool,
}

impl Permission {
    pub fn new(property_name: impl Into<String>, level: PermissionLevel, locked: bool) -> Self {
        let property_name = property_name.into();
        Self {
            display_name: property_name.clone(),
            property_name,
            level,
            locked,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

/// A group's grant on one record type plus its per-field permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub type_key: String,
    #[serde(default)]
    pub display_name: String,
    pub level: AccessLevel,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Access {
    pub fn new(type_key: impl Into<String>, level: AccessLevel, locked: bool) -> Self {
        let type_key = type_key.into();
        Self {
            display_name: type_key.clone(),
            type_key,
            level,
            locked,
            permissions: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Adds or replaces the permission for its property name.
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.put_permission(permission);
        self
    }

    pub fn put_permission(&mut self, permission: Permission) {
        match self
            .permissions
            .iter_mut()
            .find(|p| p.property_name == permission.property_name)
        {
            Some(existing) => *existing = permission,
            None => self.permissions.push(permission),
        }
    }

    pub fn permission(&self, property_name: &str) -> Option<&Permission> {
        self.permissions
            .iter()
            .find(|p| p.property_name == property_name)
    }

    pub fn permission_mut(&mut self, property_name: &str) -> Option<&mut Permission> {
        self.permissions
            .iter_mut()
            .find(|p| p.property_name == property_name)
    }

    /// The name the policy store indexes this type under.
    ///
    /// Falls back to the type key when no display name was given.
    pub fn effective_display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.type_key
        } else {
            &self.display_name
        }
    }
}

/// A named security group: its members and one [`Access`] per type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Repository identifier, assigned on first save
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub access: Vec<Access>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            members: BTreeSet::new(),
            access: Vec::new(),
        }
    }

    pub fn with_member(mut self, username: impl Into<String>) -> Self {
        self.add_member(username);
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.put_access(access);
        self
    }

    pub fn with_access_list(mut self, access: impl IntoIterator<Item = Access>) -> Self {
        for a in access {
            self.put_access(a);
        }
        self
    }

    /// Adds a member unless an entry differing only by case is already present.
    pub fn add_member(&mut self, username: impl Into<String>) -> bool {
        let username = username.into();
        if self.has_member(&username) {
            return false;
        }
        self.members.insert(username)
    }

    /// Case-insensitive, with the same upper-casing the policy store uses for its user index.
    pub fn has_member(&self, username: &str) -> bool {
        let wanted = username.to_uppercase();
        self.members.iter().any(|m| m.to_uppercase() == wanted)
    }

    /// Adds or replaces the access for its type key.
    pub fn put_access(&mut self, access: Access) {
        match self.access.iter_mut().find(|a| a.type_key == access.type_key) {
            Some(existing) => *existing = access,
            None => self.access.push(access),
        }
    }

    pub fn access_for(&self, type_key: &str) -> Option<&Access> {
        self.access.iter().find(|a| a.type_key == type_key)
    }

    pub fn access_for_mut(&mut self, type_key: &str) -> Option<&mut Access> {
        self.access.iter_mut().find(|a| a.type_key == type_key)
    }
}
