//! Strongly-typed identifiers for local accounts.
//!
//! Identifiers are ULIDs, so an engine can mint one before the account
//! exists in the store (the link table is written first, see the
//! provisioner in `oidc-link-relying-party`).

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Generates a prefixed ULID wrapper.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Ulid> for $name {
            fn from(ulid: Ulid) -> Self {
                Self(ulid)
            }
        }

        impl From<$name> for Ulid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a local account.
    AccountId,
    "acct"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_display_format() {
        let id = AccountId::new();
        assert!(id.to_string().starts_with("acct_"));
    }

    #[test]
    fn ulid_conversions_roundtrip() {
        let ulid = Ulid::new();
        let id = AccountId::from(ulid);
        assert_eq!(id.as_ulid(), ulid);
        assert_eq!(Ulid::from(id), ulid);
        assert_eq!(AccountId::from_ulid(ulid), id);
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashSet;

        let a = AccountId::new();
        let b = AccountId::new();

        let set: HashSet<_> = [a, b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn id_serializes_as_bare_ulid() {
        let id = AccountId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
