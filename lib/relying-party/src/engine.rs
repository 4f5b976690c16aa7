//! Authorization completion.
//!
//! [`AuthorizationEngine::complete_authorization`] runs once per provider
//! callback. It resolves the remote identity to a local account by one of
//! three routes:
//!
//! - **Linked**: the subject already has a link; its account logs in.
//! - **Connected**: no link, but an account uses the same e-mail and the
//!   site allows connecting existing users; the subject is linked to it.
//! - **Provisioned**: a new account is created when registration allows.
//!
//! Every governance outcome is a [`Completion`]. Only caller bugs and
//! store failures are errors.

use crate::account::LocalAccount;
use crate::claims::{self, ProfileClaims, TokenBundle};
use crate::error::{AuthorizationError, StoreError};
use crate::extension::{
    AuthorizationContext, ExtensionRegistry, PreAuthorizeDecision, UserinfoContext,
};
use crate::messaging::Messenger;
use crate::password;
use crate::policy::{RegistrationMode, SitePolicy};
use crate::principal::Principal;
use crate::properties::{self, IgnoredProperties};
use crate::provider::ProviderClient;
use crate::provisioner::{AccountProvisioner, Provisioned};
use crate::store::{AccountStore, LinkEntry, LinkStore};
use crate::username::DEFAULT_MAX_ATTEMPTS;
use oidc_link_core::AccountId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of an authorization completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The caller should start a session for the account and redirect.
    Authorized {
        /// The account to log in.
        account: LocalAccount,
        /// Where to send the browser.
        destination: String,
        /// True if the account was created by this completion.
        is_new: bool,
    },
    /// The account was created blocked and awaits administrator approval.
    /// No session must be started.
    PendingApproval {
        /// The new, blocked account.
        account: LocalAccount,
    },
    /// The login was refused. The user has already been notified.
    Rejected(Rejection),
}

impl Completion {
    /// Returns the account to log in, if any.
    #[must_use]
    pub fn authorized_account(&self) -> Option<&LocalAccount> {
        match self {
            Self::Authorized { account, .. } => Some(account),
            Self::PendingApproval { .. } | Self::Rejected(_) => None,
        }
    }

    /// Returns the rejection, if the login was refused.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Authorized { .. } | Self::PendingApproval { .. } => None,
        }
    }
}

/// Why a login was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The provider returned no tokens for the authorization code.
    TokenRetrieval { provider: String },
    /// No subject, or the two claim sets disagree on it.
    MissingSubject { provider: String },
    /// The profile claims carry no e-mail address.
    MissingEmail { provider: String },
    /// The e-mail address is not syntactically valid.
    InvalidEmail { email: String },
    /// An extension denied the login.
    DeniedByExtension { provider: String, extension: String },
    /// The target account is blocked.
    Blocked { name: String },
    /// An unlinked account already uses the e-mail address.
    EmailTaken { email: String },
    /// The site does not let visitors register.
    RegistrationClosed,
}

impl Rejection {
    /// Returns true for protocol failures and inconsistent claims, as
    /// opposed to policy decisions.
    #[must_use]
    pub fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            Self::TokenRetrieval { .. } | Self::MissingSubject { .. } | Self::MissingEmail { .. }
        )
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenRetrieval { provider }
            | Self::MissingSubject { provider }
            | Self::MissingEmail { provider }
            | Self::DeniedByExtension { provider, .. } => write!(
                f,
                "Logging in with {provider} could not be completed due to an error."
            ),
            Self::InvalidEmail { email } => write!(f, "The e-mail address is not valid: {email}"),
            Self::Blocked { name } => write!(
                f,
                "The username {name} has not been activated or is blocked."
            ),
            Self::EmailTaken { email } => {
                write!(f, "The e-mail address is already taken: {email}")
            }
            Self::RegistrationClosed => f.write_str("Only administrators can register new accounts."),
        }
    }
}

/// Informational message shown when a new account awaits approval.
pub const PENDING_APPROVAL_MESSAGE: &str = "Thank you for applying for an account. Your account is currently pending approval by the site administrator.";

/// Orchestrates authorization completions.
pub struct AuthorizationEngine {
    accounts: Arc<dyn AccountStore>,
    links: Arc<dyn LinkStore>,
    extensions: Arc<ExtensionRegistry>,
    messenger: Arc<dyn Messenger>,
    max_username_attempts: usize,
}

impl fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("extensions", &self.extensions)
            .field("max_username_attempts", &self.max_username_attempts)
            .finish_non_exhaustive()
    }
}

/// The account a completion is working on.
struct Target {
    account: LocalAccount,
    is_new: bool,
}

/// What the link store holds for a subject.
enum Linked {
    Unlinked,
    Account(LocalAccount),
    /// The link exists but its account is not visible.
    Dangling(AccountId),
}

impl AuthorizationEngine {
    /// Creates an engine over its collaborators.
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        links: Arc<dyn LinkStore>,
        extensions: Arc<ExtensionRegistry>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            accounts,
            links,
            extensions,
            messenger,
            max_username_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many account names provisioning tries before failing.
    #[must_use]
    pub fn with_max_username_attempts(mut self, attempts: usize) -> Self {
        self.max_username_attempts = attempts;
        self
    }

    /// Exchanges an authorization code and completes the authorization.
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizationEngine::complete_authorization`].
    #[instrument(skip_all, fields(provider = %client.plugin_id()))]
    pub async fn complete_from_code<C: ProviderClient + ?Sized>(
        &self,
        principal: &Principal,
        client: &C,
        code: &str,
        policy: &SitePolicy,
        destination: &str,
    ) -> oidc_link_core::Result<Completion, AuthorizationError> {
        guard_anonymous(principal)?;

        let Some(tokens) = client.retrieve_tokens(code).await else {
            error!(provider = client.plugin_id(), "Failed to get authentication tokens");
            return Ok(self.reject(Rejection::TokenRetrieval {
                provider: client.label().to_string(),
            }));
        };

        self.complete_authorization(principal, client, &tokens, policy, destination)
            .await
    }

    /// Resolves the provider identity behind `tokens` to a local account.
    ///
    /// The caller starts the session for an [`Completion::Authorized`]
    /// account. Rejections have already been shown to the user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::ReentrancyViolation`] without touching
    /// any collaborator if `principal` is already authenticated. Returns
    /// [`AuthorizationError::ProvisionFailure`] or
    /// [`AuthorizationError::Store`] when a store fails.
    #[instrument(skip_all, fields(provider = %client.plugin_id()))]
    pub async fn complete_authorization<C: ProviderClient + ?Sized>(
        &self,
        principal: &Principal,
        client: &C,
        tokens: &TokenBundle,
        policy: &SitePolicy,
        destination: &str,
    ) -> oidc_link_core::Result<Completion, AuthorizationError> {
        guard_anonymous(principal)?;

        let provider = client.plugin_id();
        let label = client.label();
        let client_name = client.client_name();

        let identity_claims = client
            .decode_id_token(&tokens.id_token)
            .await
            .unwrap_or_default();
        let mut profile_claims = client
            .retrieve_userinfo(&tokens.access_token)
            .await
            .unwrap_or_default();

        self.extensions.alter_userinfo(
            &mut profile_claims,
            &UserinfoContext {
                tokens,
                plugin_id: provider,
                identity_claims: &identity_claims,
            },
        );

        let Some(subject) = claims::resolve_subject(&identity_claims, &profile_claims) else {
            error!(provider, "No \"sub\" found from {provider}");
            return Ok(self.reject(Rejection::MissingSubject {
                provider: label.to_string(),
            }));
        };

        let Some(email) = profile_claims.email().map(str::to_string) else {
            error!(provider, subject = %subject, "No e-mail address provided by {provider}");
            return Ok(self.reject(Rejection::MissingEmail {
                provider: label.to_string(),
            }));
        };

        let ignored = properties::ignored_properties(&self.extensions);
        let linked = match self.linked_account(client_name, &subject).await? {
            Linked::Unlinked => None,
            Linked::Account(account) => Some(account),
            Linked::Dangling(account_id) => {
                warn!(account_id = %account_id, "link points to an account that is not visible");
                Some(self.adopt_concurrent_link(client_name, &subject).await?.account)
            }
        };

        let mut context = AuthorizationContext {
            tokens: tokens.clone(),
            plugin_id: provider.to_string(),
            identity_claims,
            profile_claims,
            subject,
            is_new: false,
        };

        let target = match self.extensions.pre_authorize(linked.as_ref(), &context).await {
            PreAuthorizeDecision::Deny { extension } => {
                info!(provider, extension = %extension, "Login denied for {email} via pre-authorize hook");
                return Ok(self.reject(Rejection::DeniedByExtension {
                    provider: label.to_string(),
                    extension,
                }));
            }
            PreAuthorizeDecision::Redirect { extension, account } => {
                debug!(extension = %extension, account_id = %account.id(), "pre-authorize hook chose the account");
                Some(account)
            }
            PreAuthorizeDecision::Proceed => linked,
        };

        let target = match target {
            Some(account) => Target {
                account,
                is_new: false,
            },
            None => {
                match self
                    .resolve_unlinked(client_name, &email, &context, policy)
                    .await?
                {
                    Ok(target) => target,
                    Err(rejection) => return Ok(self.reject(rejection)),
                }
            }
        };

        let Target { account, is_new } = target;

        if account.is_blocked() && !is_new {
            info!(account_id = %account.id(), "login refused for blocked account");
            return Ok(self.reject(Rejection::Blocked {
                name: account.name().to_string(),
            }));
        }

        context.is_new = is_new;
        let account = if policy.always_save_userinfo() || is_new {
            self.save_userinfo(account, &context, &ignored, policy).await?
        } else {
            account
        };

        if account.is_blocked() {
            info!(account_id = %account.id(), "account created pending approval");
            self.messenger.notify_info(PENDING_APPROVAL_MESSAGE);
            return Ok(Completion::PendingApproval { account });
        }

        self.extensions.post_authorize(&account, &context).await;

        info!(account_id = %account.id(), is_new, "authorization completed");
        Ok(Completion::Authorized {
            account,
            destination: destination.to_string(),
            is_new,
        })
    }

    /// Lists the provider links held by an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the link store fails.
    pub async fn connected_accounts(
        &self,
        account_id: AccountId,
    ) -> oidc_link_core::Result<Vec<LinkEntry>, AuthorizationError> {
        let links = self
            .links
            .links_for(account_id)
            .await
            .map_err(AuthorizationError::from)?;
        Ok(links)
    }

    /// Decides whether a principal may set a local password.
    ///
    /// See [`password::can_set_local_password`].
    ///
    /// # Errors
    ///
    /// Returns an error if the link store fails.
    pub async fn can_set_local_password(
        &self,
        current: &Principal,
        account: Option<&Principal>,
    ) -> oidc_link_core::Result<bool, StoreError> {
        password::can_set_local_password(self.links.as_ref(), current, account).await
    }

    /// Handles a subject with no usable link: connect by e-mail or provision.
    ///
    /// The outer result carries store failures, the inner one rejections.
    async fn resolve_unlinked(
        &self,
        client_name: &str,
        email: &str,
        context: &AuthorizationContext,
        policy: &SitePolicy,
    ) -> Result<Result<Target, Rejection>, AuthorizationError> {
        let subject = context.subject.as_str();

        if !claims::is_valid_email(email) {
            info!(email, "login refused for invalid e-mail address");
            return Ok(Err(Rejection::InvalidEmail {
                email: email.to_string(),
            }));
        }

        let existing = self
            .accounts
            .find_by_email(email)
            .await?
            .into_iter()
            .next();

        if let Some(account) = existing {
            if !policy.connect_existing_users() {
                info!(email, account_id = %account.id(), "e-mail taken and connecting existing users is disabled");
                return Ok(Err(Rejection::EmailTaken {
                    email: email.to_string(),
                }));
            }
            if account.is_blocked() {
                info!(account_id = %account.id(), "refusing to connect blocked account");
                return Ok(Err(Rejection::Blocked {
                    name: account.name().to_string(),
                }));
            }

            return match self.links.insert(client_name, subject, account.id()).await {
                Ok(_) => {
                    info!(account_id = %account.id(), "connected existing account");
                    Ok(Ok(Target {
                        account,
                        is_new: false,
                    }))
                }
                Err(StoreError::SubjectAlreadyLinked { .. }) => self
                    .adopt_concurrent_link(client_name, subject)
                    .await
                    .map(Ok),
                Err(e) => Err(e.into()),
            };
        }

        let active = match policy.effective_registration_mode() {
            RegistrationMode::AdminOnly => {
                info!(email, "registration closed to visitors");
                return Ok(Err(Rejection::RegistrationClosed));
            }
            RegistrationMode::AdminApproval => false,
            RegistrationMode::Open => true,
        };

        let provisioned = AccountProvisioner::new(self.accounts.as_ref(), self.links.as_ref())
            .with_max_attempts(self.max_username_attempts)
            .create_account(subject, &context.profile_claims, client_name, active)
            .await?;

        match provisioned {
            Provisioned::Created(account) => Ok(Ok(Target {
                account,
                is_new: true,
            })),
            Provisioned::AlreadyLinked => self
                .adopt_concurrent_link(client_name, subject)
                .await
                .map(Ok),
        }
    }

    /// Loads the account linked to a subject.
    async fn linked_account(
        &self,
        client_name: &str,
        subject: &str,
    ) -> Result<Linked, AuthorizationError> {
        let Some(link) = self.links.lookup(client_name, subject).await? else {
            return Ok(Linked::Unlinked);
        };

        Ok(match self.accounts.find_by_id(link.account_id).await? {
            Some(account) => Linked::Account(account),
            None => Linked::Dangling(link.account_id),
        })
    }

    /// Re-reads a link another completion inserted or is still completing.
    async fn adopt_concurrent_link(
        &self,
        client_name: &str,
        subject: &str,
    ) -> Result<Target, AuthorizationError> {
        info!("subject linked concurrently, re-reading the link");
        match self.linked_account(client_name, subject).await? {
            Linked::Account(account) => Ok(Target {
                account,
                is_new: false,
            }),
            Linked::Unlinked | Linked::Dangling(_) => Err(AuthorizationError::ProvisionFailure {
                reason: format!("subject '{subject}' is linked but its account is unavailable"),
            }),
        }
    }

    /// Copies mapped claims onto the account and persists it.
    ///
    /// Returns the stored state: the merged account, or the account as it
    /// was if an extension vetoed the save.
    async fn save_userinfo(
        &self,
        account: LocalAccount,
        context: &AuthorizationContext,
        ignored: &IgnoredProperties,
        policy: &SitePolicy,
    ) -> Result<LocalAccount, AuthorizationError> {
        let mut merged = account.clone();
        merge_claims(&mut merged, &context.profile_claims, ignored, policy);

        if !self.extensions.userinfo_save(&merged, context).await {
            debug!(account_id = %account.id(), "userinfo not saved");
            return Ok(account);
        }

        self.accounts.save(&merged).await?;
        Ok(merged)
    }

    fn reject(&self, rejection: Rejection) -> Completion {
        self.messenger.notify_error(&rejection.to_string());
        Completion::Rejected(rejection)
    }
}

fn guard_anonymous(principal: &Principal) -> Result<(), AuthorizationError> {
    match principal.account_id() {
        Some(account_id) => {
            error!(account_id = %account_id, "authorization completion attempted while logged in");
            Err(AuthorizationError::ReentrancyViolation { account_id })
        }
        None => Ok(()),
    }
}

/// Sets every mapped, non-ignored claim present in the profile.
fn merge_claims(
    account: &mut LocalAccount,
    profile: &ProfileClaims,
    ignored: &IgnoredProperties,
    policy: &SitePolicy,
) {
    for (claim, property) in policy.claim_to_property_map() {
        if ignored.contains(property) {
            debug!(claim = %claim, property = %property, "skipping ignored property");
            continue;
        }
        let Some(value) = profile.get(claim).filter(|v| !v.is_null()) else {
            continue;
        };
        if !account.set_property(property, value) {
            warn!(claim = %claim, property = %property, "claim value rejected by property");
        }
    }
}
