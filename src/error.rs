//! # Filter Error Handling
//!
//! Unified error type for the property filter. Every variant except the
//! lock and storage plumbing represents a configuration problem: a group, type,
//! field or user binding the caller expected to exist but that the current
//! policy snapshot does not know about.
//!
//! A denied save is not an error. It is reported through
//! [`SaveOutcome::Denied`](crate::filter::SaveOutcome) so callers branch on a
//! value instead of unwinding.

use thiserror::Error;

/// Unified error type for filter, policy store and reconciliation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    // ========== Policy lookup errors ==========
    /// The queried group is not part of the current snapshot
    #[error("Unable to find group {group}")]
    GroupNotFound { group: String },

    /// The user has no group binding
    #[error("User {username} has no group assigned")]
    NoGroupAssigned { username: String },

    /// The group exists but carries no access entry for the type
    #[error("Group {group} does not have any access set for type {type_key}")]
    AccessNotDefined { group: String, type_key: String },

    /// A declared field has no permission entry on the type's access
    #[error("No permission defined for field {field} on type {type_key}")]
    PermissionNotDefined { type_key: String, field: String },

    // ========== Record model errors ==========
    /// A default instance could not be constructed
    #[error("Unable to construct an instance of {type_key}: {reason}")]
    ConstructionFailure { type_key: String, reason: String },

    /// The property accessor has no descriptor for the type
    #[error("Type {type_key} is not registered with the property accessor")]
    TypeNotRegistered { type_key: String },

    /// Caller contract violation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========== Infrastructure errors ==========
    /// Group persistence failed
    #[error("Repository operation failed: {operation} - {reason}")]
    Repository { operation: String, reason: String },

    /// Serialization or deserialization failed
    #[error("Serialization error: {context} - {reason}")]
    Serialization { context: String, reason: String },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lock was poisoned by a panicking holder
    #[error("Lock error: failed to acquire {lock_type} lock for {resource}")]
    LockPoisoned { lock_type: String, resource: String },
}

impl FilterError {
    /// Create a GroupNotFound error
    pub fn group_not_found(group: impl Into<String>) -> Self {
        Self::GroupNotFound {
            group: group.into(),
        }
    }

    /// Create a NoGroupAssigned error
    pub fn no_group_assigned(username: impl Into<String>) -> Self {
        Self::NoGroupAssigned {
            username: username.into(),
        }
    }

    /// Create an AccessNotDefined error
    pub fn access_not_defined(group: impl Into<String>, type_key: impl Into<String>) -> Self {
        Self::AccessNotDefined {
            group: group.into(),
            type_key: type_key.into(),
        }
    }

    /// Create a PermissionNotDefined error
    pub fn permission_not_defined(type_key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::PermissionNotDefined {
            type_key: type_key.into(),
            field: field.into(),
        }
    }

    /// Create a ConstructionFailure error
    pub fn construction_failure(type_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConstructionFailure {
            type_key: type_key.into(),
            reason: reason.into(),
        }
    }

    /// Create a TypeNotRegistered error
    pub fn type_not_registered(type_key: impl Into<String>) -> Self {
        Self::TypeNotRegistered {
            type_key: type_key.into(),
        }
    }

    /// Create a Repository error
    pub fn repository(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Repository {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Serialization {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a read LockPoisoned error
    pub fn read_lock(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            lock_type: "read".to_string(),
            resource: resource.into(),
        }
    }

    /// Create a write LockPoisoned error
    pub fn write_lock(resource: impl Into<String>) -> Self {
        Self::LockPoisoned {
            lock_type: "write".to_string(),
            resource: resource.into(),
        }
    }

    /// True for the lookup failures that mean "this subject cannot see that type".
    ///
    /// The boolean access checks report these quietly as `false`; any other
    /// error there is logged as a warning.
    pub fn is_policy_miss(&self) -> bool {
        matches!(
            self,
            Self::GroupNotFound { .. } | Self::NoGroupAssigned { .. } | Self::AccessNotDefined { .. }
        )
    }
}

/// Conversion from sled::Error to FilterError
impl From<sled::Error> for FilterError {
    fn from(error: sled::Error) -> Self {
        FilterError::repository("sled", error.to_string())
    }
}

/// Conversion from serde_json::Error to FilterError
impl From<serde_json::Error> for FilterError {
    fn from(error: serde_json::Error) -> Self {
        FilterError::serialization("json", error.to_string())
    }
}

/// Conversion from toml::de::Error to FilterError
impl From<toml::de::Error> for FilterError {
    fn from(error: toml::de::Error) -> Self {
        FilterError::Config(error.to_string())
    }
}

/// Result type alias for operations that can result in a FilterError
pub type FilterResult<T> = Result<T, FilterError>;
