//! Error types for the relying-party crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: Failures reported by the account and link stores
//! - `ProvisionError`: Failures while creating a local account
//! - `AuthorizationError`: Hard failures of an authorization completion
//!
//! Expected governance outcomes (blocked accounts, disabled registration,
//! inconsistent claims) are not errors. They are reported as
//! [`Rejection`](crate::engine::Rejection) values.

use oidc_link_core::AccountId;
use std::fmt;

/// Errors from account and link store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An account with this name already exists.
    NameTaken { name: String },
    /// The subject is already linked for this provider client.
    SubjectAlreadyLinked { client_name: String, subject: String },
    /// The account does not exist.
    NotFound { account_id: AccountId },
    /// The storage backend failed.
    Backend { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameTaken { name } => write!(f, "account name '{name}' is already taken"),
            Self::SubjectAlreadyLinked {
                client_name,
                subject,
            } => {
                write!(f, "subject '{subject}' is already linked for '{client_name}'")
            }
            Self::NotFound { account_id } => write!(f, "account not found: {account_id}"),
            Self::Backend { details } => write!(f, "storage backend error: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from account provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// The profile claims carry no e-mail address.
    MissingEmail,
    /// No free username was found within the attempt limit.
    UsernameExhausted { base: String, attempts: usize },
    /// The store rejected the account or its link.
    Store(StoreError),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEmail => write!(f, "profile claims carry no e-mail address"),
            Self::UsernameExhausted { base, attempts } => {
                write!(
                    f,
                    "no free username derived from '{base}' after {attempts} attempts"
                )
            }
            Self::Store(e) => write!(f, "provisioning store error: {e}"),
        }
    }
}

impl std::error::Error for ProvisionError {}

impl From<StoreError> for ProvisionError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Hard failures of an authorization completion.
///
/// Everything here aborts the flow without a user-facing rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// Authorization was attempted while a principal is already logged in.
    ///
    /// This is a caller bug, not a recoverable condition.
    ReentrancyViolation { account_id: AccountId },
    /// A new account or its link could not be created.
    ProvisionFailure { reason: String },
    /// A store failed outside of provisioning.
    Store { details: String },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReentrancyViolation { account_id } => {
                write!(
                    f,
                    "authorization attempted while {account_id} is already authenticated"
                )
            }
            Self::ProvisionFailure { reason } => {
                write!(f, "account provisioning failed: {reason}")
            }
            Self::Store { details } => write!(f, "account store failed: {details}"),
        }
    }
}

impl std::error::Error for AuthorizationError {}

impl From<StoreError> for AuthorizationError {
    fn from(e: StoreError) -> Self {
        Self::Store {
            details: e.to_string(),
        }
    }
}

impl From<ProvisionError> for AuthorizationError {
    fn from(e: ProvisionError) -> Self {
        Self::ProvisionFailure {
            reason: e.to_string(),
        }
    }
}
