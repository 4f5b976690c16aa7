//! Account creation for never-seen subjects.
//!
//! The link is reserved before the account is created. The link store's
//! `(client_name, subject)` uniqueness is the serialization point between
//! concurrent completions for the same subject: whoever inserts the link
//! first creates the account, everyone else sees
//! [`Provisioned::AlreadyLinked`] and re-reads the link.

use crate::account::{AccountStatus, LocalAccount, LocalPassword, NewAccount, ProviderLink};
use crate::claims::ProfileClaims;
use crate::error::{ProvisionError, StoreError};
use crate::store::{AccountStore, LinkStore};
use crate::username::{self, DEFAULT_MAX_ATTEMPTS};
use oidc_link_core::AccountId;
use rand::distr::{Alphanumeric, SampleString as _};
use tracing::{debug, error, info, instrument};

/// Length of the generated local password.
const PASSWORD_LENGTH: usize = 32;

/// Outcome of a provisioning attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The account was created and linked.
    Created(LocalAccount),
    /// Another completion linked the subject first. Nothing was created.
    AlreadyLinked,
}

/// Creates linked local accounts.
#[derive(Debug)]
pub struct AccountProvisioner<'a, A: ?Sized, L: ?Sized> {
    accounts: &'a A,
    links: &'a L,
    max_attempts: usize,
}

impl<'a, A, L> AccountProvisioner<'a, A, L>
where
    A: AccountStore + ?Sized,
    L: LinkStore + ?Sized,
{
    /// Creates a provisioner over the two stores.
    #[must_use]
    pub fn new(accounts: &'a A, links: &'a L) -> Self {
        Self {
            accounts,
            links,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many account names are tried before giving up.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Creates an account for a subject and links it.
    ///
    /// The account gets a random local password it never logs in with, and
    /// its e-mail and registration e-mail are both the profile's `email`.
    /// An inactive account is created blocked.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::MissingEmail`] if the profile has no
    /// e-mail, [`ProvisionError::UsernameExhausted`] if no free name is
    /// found, or a store error. The reserved link is released on failure.
    #[instrument(skip(self, profile, client_name), fields(client_name = %client_name))]
    pub async fn create_account(
        &self,
        subject: &str,
        profile: &ProfileClaims,
        client_name: &str,
        active: bool,
    ) -> Result<Provisioned, ProvisionError> {
        let email = profile.email().ok_or(ProvisionError::MissingEmail)?;
        let id = AccountId::new();

        match self.links.insert(client_name, subject, id).await {
            Ok(_) => {}
            Err(StoreError::SubjectAlreadyLinked { .. }) => {
                info!("subject linked concurrently, not creating an account");
                return Ok(Provisioned::AlreadyLinked);
            }
            Err(e) => return Err(e.into()),
        }

        match self.create_linked(id, subject, profile, client_name, email, active).await {
            Ok(account) => {
                info!(account_id = %account.id(), name = %account.name(), "account created");
                Ok(Provisioned::Created(account))
            }
            Err(e) => {
                self.release_link(client_name, subject).await;
                Err(e)
            }
        }
    }

    async fn create_linked(
        &self,
        id: AccountId,
        subject: &str,
        profile: &ProfileClaims,
        client_name: &str,
        email: &str,
        active: bool,
    ) -> Result<LocalAccount, ProvisionError> {
        let base = username::candidate_username(subject, profile, client_name);
        let mut from = 0;

        loop {
            let (name, attempt) =
                username::next_free_username(self.accounts, &base, from, self.max_attempts)
                    .await?;

            let new = NewAccount {
                id,
                name,
                password: LocalPassword::new(
                    Alphanumeric.sample_string(&mut rand::rng(), PASSWORD_LENGTH),
                ),
                email: email.to_string(),
                init_email: email.to_string(),
                status: AccountStatus::from_active(active),
                provider_link: ProviderLink::new(client_name, subject),
            };

            match self.accounts.create(new).await {
                Ok(account) => return Ok(account),
                Err(StoreError::NameTaken { name }) => {
                    debug!(name = %name, "account name claimed concurrently, retrying");
                    from = attempt + 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn release_link(&self, client_name: &str, subject: &str) {
        if let Err(e) = self.links.remove(client_name, subject).await {
            error!(error = %e, "failed to release link after provisioning failure");
        }
    }
}
