//! Account properties that claim merge must never write.

use crate::extension::ExtensionRegistry;
use std::collections::{BTreeSet, HashSet};

/// Identity, audit and credential properties that are always ignored.
pub const BASELINE_IGNORED: &[&str] = &[
    "id",
    "name",
    "password",
    "email",
    "init_email",
    "status",
    "roles",
    "provider_link",
    "created_at",
    "updated_at",
    "last_access",
    "last_login",
    "langcode",
    "preferred_langcode",
    "preferred_admin_langcode",
    "default_langcode",
];

/// The set of ignored property names for one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredProperties(HashSet<String>);

impl IgnoredProperties {
    /// Returns only the baseline set.
    #[must_use]
    pub fn baseline() -> Self {
        Self(BASELINE_IGNORED.iter().map(ToString::to_string).collect())
    }

    /// Returns true if claim merge must skip this property.
    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.0.contains(property)
    }

    /// Returns the number of ignored properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is ignored. Never true for a computed set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Computes the ignored-property set.
///
/// Extensions may add names. Baseline names are re-added afterwards, so an
/// extension cannot remove them.
#[must_use]
pub fn ignored_properties(extensions: &ExtensionRegistry) -> IgnoredProperties {
    let mut names: BTreeSet<String> = BASELINE_IGNORED.iter().map(ToString::to_string).collect();
    extensions.alter_ignored_properties(&mut names);
    names.extend(BASELINE_IGNORED.iter().map(ToString::to_string));
    IgnoredProperties(names.into_iter().collect())
}
