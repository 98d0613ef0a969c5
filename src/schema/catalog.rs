//! Type catalog boundary.
//!
//! The catalog answers "which record types exist under this namespace and
//! what do their markers say". The reconciler only ever sees its output as a
//! list of [`Access`] entries carrying defaults and lock flags.

use crate::error::FilterResult;
use crate::permissions::types::policy::{Access, AccessLevel, PermissionLevel};
use serde::{Deserialize, Serialize};

/// Source of the master access list the reconciler syncs groups against.
pub trait TypeCatalog: Send + Sync {
    /// One access per discoverable type in the namespace, permissions included.
    fn discover(&self, namespace: &str) -> FilterResult<Vec<Access>>;

    /// Type keys in the namespace that opted out of filtering entirely.
    fn ignored_types(&self, namespace: &str) -> FilterResult<Vec<String>>;
}

/// Levels handed to types and fields that carry no marker.
///
/// Unmarked entries come out unlocked, so operators may change them later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDefaults {
    #[serde(default)]
    pub access: AccessLevel,
    #[serde(default)]
    pub permission: PermissionLevel,
}

impl Default for CatalogDefaults {
    fn default() -> Self {
        Self {
            access: AccessLevel::NoAccess,
            permission: PermissionLevel::NoAccess,
        }
    }
}

/// Whether `type_namespace` is `namespace` or nested beneath it.
pub fn namespace_matches(namespace: &str, type_namespace: &str) -> bool {
    type_namespace == namespace
        || (type_namespace.starts_with(namespace)
            && type_namespace[namespace.len()..].starts_with('.'))
}

#[derive(Clone, Copy, PartialEq)]
enum CharClass {
    Upper,
    Lower,
    Digit,
    Other,
}

fn char_class(c: char) -> CharClass {
    if c.is_uppercase() {
        CharClass::Upper
    } else if c.is_lowercase() {
        CharClass::Lower
    } else if c.is_numeric() {
        CharClass::Digit
    } else {
        CharClass::Other
    }
}

/// Splits on changes of character class, keeping an upper-case run's last
/// letter with the lower-case run that follows it (`HTTPServer` -> `HTTP`, `Server`).
fn split_camel_case(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut start = 0;
    for pos in 1..chars.len() {
        let prev = char_class(chars[pos - 1]);
        let current = char_class(chars[pos]);
        if prev == current {
            continue;
        }
        if prev == CharClass::Upper && current == CharClass::Lower {
            if pos - 1 > start {
                words.push(chars[start..pos - 1].iter().collect());
                start = pos - 1;
            }
            continue;
        }
        words.push(chars[start..pos].iter().collect());
        start = pos;
    }
    if start < chars.len() {
        words.push(chars[start..].iter().collect());
    }
    words
}

fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Human-readable label for a property name: `secondTestClasses` -> `Second Test Classes`.
pub fn build_display_name(property_name: &str) -> String {
    split_camel_case(&capitalize_first(property_name))
        .into_iter()
        .filter(|w| !w.chars().all(|c| c == '_'))
        .collect::<Vec<_>>()
        .join(" ")
}
