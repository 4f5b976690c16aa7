//! The acting principal of a request.
//!
//! Operations take the principal as an explicit argument instead of
//! reading ambient session state.

use oidc_link_core::AccountId;
use std::collections::BTreeSet;

/// Permission allowing a principal to set their own local password even
/// when their account is linked to a provider.
pub const SET_OWN_PASSWORD_PERMISSION: &str = "openid connect set own password";

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    /// No session.
    #[default]
    Anonymous,
    /// A logged-in account.
    Authenticated(AuthenticatedPrincipal),
}

impl Principal {
    /// Creates an authenticated principal with no permissions.
    #[must_use]
    pub fn authenticated(account_id: AccountId) -> Self {
        Self::Authenticated(AuthenticatedPrincipal::new(account_id))
    }

    /// Returns true if a session exists.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Returns the account ID of an authenticated principal.
    #[must_use]
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(p) => Some(p.account_id()),
        }
    }

    /// Returns true if the principal holds the permission.
    ///
    /// Anonymous principals hold no permissions.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        match self {
            Self::Anonymous => false,
            Self::Authenticated(p) => p.has_permission(permission),
        }
    }
}

impl From<AuthenticatedPrincipal> for Principal {
    fn from(principal: AuthenticatedPrincipal) -> Self {
        Self::Authenticated(principal)
    }
}

/// A logged-in account and the permissions its roles grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    account_id: AccountId,
    permissions: BTreeSet<String>,
}

impl AuthenticatedPrincipal {
    /// Creates a principal with no permissions.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            permissions: BTreeSet::new(),
        }
    }

    /// Grants a permission.
    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Returns the account ID.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// Returns true if the principal holds the permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Returns the granted permissions.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }
}
