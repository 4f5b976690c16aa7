//! Account and link store traits.
//!
//! Both stores are external collaborators. The engine relies on two
//! uniqueness constraints they must enforce atomically:
//! - account names are unique ([`StoreError::NameTaken`])
//! - a `(client_name, subject)` pair links to at most one account
//!   ([`StoreError::SubjectAlreadyLinked`])

use crate::account::{LocalAccount, NewAccount};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidc_link_core::AccountId;
use serde::{Deserialize, Serialize};

/// A persisted binding between a provider subject and a local account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEntry {
    /// Name of the provider client.
    pub client_name: String,
    /// The provider-scoped subject.
    pub subject: String,
    /// The linked local account.
    pub account_id: AccountId,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

impl LinkEntry {
    /// Creates a link entry stamped with the current time.
    #[must_use]
    pub fn new(
        client_name: impl Into<String>,
        subject: impl Into<String>,
        account_id: AccountId,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            subject: subject.into(),
            account_id,
            created_at: Utc::now(),
        }
    }
}

/// Storage for local accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NameTaken`] if the name is already used.
    async fn create(&self, account: NewAccount) -> Result<LocalAccount, StoreError>;

    /// Persists changes to an existing account.
    async fn save(&self, account: &LocalAccount) -> Result<(), StoreError>;

    /// Loads an account by ID.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<LocalAccount>, StoreError>;

    /// Loads an account by its unique name.
    async fn find_by_name(&self, name: &str) -> Result<Option<LocalAccount>, StoreError>;

    /// Loads all accounts using an e-mail address.
    async fn find_by_email(&self, email: &str) -> Result<Vec<LocalAccount>, StoreError>;
}

/// Storage for the subject-to-account link table.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Looks up the link for a subject of a provider client.
    async fn lookup(
        &self,
        client_name: &str,
        subject: &str,
    ) -> Result<Option<LinkEntry>, StoreError>;

    /// Inserts a link.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SubjectAlreadyLinked`] if the subject is
    /// already linked for this client, including by a concurrent insert.
    async fn insert(
        &self,
        client_name: &str,
        subject: &str,
        account_id: AccountId,
    ) -> Result<LinkEntry, StoreError>;

    /// Removes a link. Removing a missing link is not an error.
    async fn remove(&self, client_name: &str, subject: &str) -> Result<(), StoreError>;

    /// Lists every link held by an account.
    async fn links_for(&self, account_id: AccountId) -> Result<Vec<LinkEntry>, StoreError>;
}
