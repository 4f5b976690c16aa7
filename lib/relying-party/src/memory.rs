//! In-memory store implementations.
//!
//! Useful for tests and single-process deployments. Every operation holds
//! the store's lock for its whole duration, so the uniqueness checks are
//! atomic with the writes.

use crate::account::{LocalAccount, NewAccount};
use crate::error::StoreError;
use crate::store::{AccountStore, LinkEntry, LinkStore};
use async_trait::async_trait;
use oidc_link_core::AccountId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// In-memory [`AccountStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStore {
    accounts: Arc<Mutex<HashMap<AccountId, LocalAccount>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryAccountStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an account directly, bypassing the uniqueness check.
    ///
    /// Does not count as a write.
    pub async fn seed(&self, account: LocalAccount) {
        self.accounts.lock().await.insert(account.id(), account);
    }

    /// Returns all stored accounts.
    pub async fn accounts(&self) -> Vec<LocalAccount> {
        self.accounts.lock().await.values().cloned().collect()
    }

    /// Returns the number of successful `create` and `save` calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(&self, account: NewAccount) -> Result<LocalAccount, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.values().any(|a| a.name() == account.name) {
            return Err(StoreError::NameTaken { name: account.name });
        }
        let account = LocalAccount::from_new(account);
        accounts.insert(account.id(), account.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(account)
    }

    async fn save(&self, account: &LocalAccount) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts
            .values()
            .any(|a| a.id() != account.id() && a.name() == account.name())
        {
            return Err(StoreError::NameTaken {
                name: account.name().to_string(),
            });
        }
        let slot = accounts
            .get_mut(&account.id())
            .ok_or(StoreError::NotFound {
                account_id: account.id(),
            })?;
        *slot = account.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<LocalAccount>, StoreError> {
        Ok(self.accounts.lock().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<LocalAccount>, StoreError> {
        Ok(self
            .accounts
            .lock()
            .await
            .values()
            .find(|a| a.name() == name)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<LocalAccount>, StoreError> {
        let mut found: Vec<LocalAccount> = self
            .accounts
            .lock()
            .await
            .values()
            .filter(|a| a.email() == email)
            .cloned()
            .collect();
        found.sort_by_key(LocalAccount::id);
        Ok(found)
    }
}

/// In-memory [`LinkStore`], keyed by `(client_name, subject)`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLinkStore {
    links: Arc<Mutex<HashMap<(String, String), LinkEntry>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryLinkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all stored links.
    pub async fn links(&self) -> Vec<LinkEntry> {
        self.links.lock().await.values().cloned().collect()
    }

    /// Returns the number of successful `insert` and `remove` calls.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    async fn lookup(
        &self,
        client_name: &str,
        subject: &str,
    ) -> Result<Option<LinkEntry>, StoreError> {
        let key = (client_name.to_string(), subject.to_string());
        Ok(self.links.lock().await.get(&key).cloned())
    }

    async fn insert(
        &self,
        client_name: &str,
        subject: &str,
        account_id: AccountId,
    ) -> Result<LinkEntry, StoreError> {
        let mut links = self.links.lock().await;
        let key = (client_name.to_string(), subject.to_string());
        if links.contains_key(&key) {
            return Err(StoreError::SubjectAlreadyLinked {
                client_name: key.0,
                subject: key.1,
            });
        }
        let entry = LinkEntry::new(client_name, subject, account_id);
        links.insert(key, entry.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entry)
    }

    async fn remove(&self, client_name: &str, subject: &str) -> Result<(), StoreError> {
        let key = (client_name.to_string(), subject.to_string());
        if self.links.lock().await.remove(&key).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn links_for(&self, account_id: AccountId) -> Result<Vec<LinkEntry>, StoreError> {
        Ok(self
            .links
            .lock()
            .await
            .values()
            .filter(|l| l.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountStatus, LocalPassword, ProviderLink};

    fn new_account(name: &str) -> NewAccount {
        NewAccount {
            id: AccountId::new(),
            name: name.to_string(),
            password: LocalPassword::new("pw".to_string()),
            email: format!("{name}@example.com"),
            init_email: format!("{name}@example.com"),
            status: AccountStatus::Active,
            provider_link: ProviderLink::new("keycloak", format!("sub_{name}")),
        }
    }

    #[tokio::test]
    async fn create_enforces_unique_names() {
        let store = InMemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();

        let err = store.create(new_account("alice")).await.unwrap_err();

        assert_eq!(
            err,
            StoreError::NameTaken {
                name: "alice".to_string()
            }
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn finds_by_name_and_email() {
        let store = InMemoryAccountStore::new();
        let created = store.create(new_account("bob")).await.unwrap();

        let by_name = store.find_by_name("bob").await.unwrap();
        let by_email = store.find_by_email("bob@example.com").await.unwrap();

        assert_eq!(by_name, Some(created.clone()));
        assert_eq!(by_email, vec![created]);
        assert!(store.find_by_name("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_requires_existing_account() {
        let store = InMemoryAccountStore::new();
        let account = LocalAccount::new(AccountId::new(), "ghost", "ghost@example.com");

        let err = store.save(&account).await.unwrap_err();

        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn seed_does_not_count_as_write() {
        let store = InMemoryAccountStore::new();
        store
            .seed(LocalAccount::new(AccountId::new(), "seeded", "s@example.com"))
            .await;

        assert_eq!(store.write_count(), 0);
        assert_eq!(store.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn link_insert_is_unique_per_client_and_subject() {
        let links = InMemoryLinkStore::new();
        let first = AccountId::new();
        links.insert("keycloak", "sub_1", first).await.unwrap();

        let err = links
            .insert("keycloak", "sub_1", AccountId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SubjectAlreadyLinked { .. }));

        // Same subject under another client is a different identity.
        links.insert("google", "sub_1", first).await.unwrap();

        let held = links.links_for(first).await.unwrap();
        assert_eq!(held.len(), 2);
    }

    #[tokio::test]
    async fn remove_deletes_link() {
        let links = InMemoryLinkStore::new();
        links
            .insert("keycloak", "sub_1", AccountId::new())
            .await
            .unwrap();

        links.remove("keycloak", "sub_1").await.unwrap();
        links.remove("keycloak", "sub_1").await.unwrap();

        assert!(links.lookup("keycloak", "sub_1").await.unwrap().is_none());
        assert_eq!(links.write_count(), 2);
    }
}
