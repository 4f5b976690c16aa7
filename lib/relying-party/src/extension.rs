//! Extension points around an authorization completion.
//!
//! Third parties observe or steer each phase by implementing [`Extension`]
//! and registering it with an [`ExtensionRegistry`]. Every method has a
//! no-op default, so an extension only overrides the phases it cares about.
//!
//! Phases, in dispatch order:
//! 1. `on_alter_ignored_properties` - add account properties claim merge must skip
//! 2. `on_alter_userinfo` - rewrite the profile claims before anything reads them
//! 3. `on_pre_authorize` - veto the login or redirect it to another account
//! 4. `on_userinfo_save` - veto persisting merged claims
//! 5. `on_post_authorize` - observe a completed login

use crate::account::LocalAccount;
use crate::claims::{IdentityClaims, ProfileClaims, TokenBundle};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// What the profile-rewrite phase can see.
#[derive(Debug, Clone, Copy)]
pub struct UserinfoContext<'a> {
    /// Tokens from the provider.
    pub tokens: &'a TokenBundle,
    /// Plugin ID of the provider client.
    pub plugin_id: &'a str,
    /// Claims decoded from the ID token.
    pub identity_claims: &'a IdentityClaims,
}

/// Full context of an authorization completion.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    /// Tokens from the provider.
    pub tokens: TokenBundle,
    /// Plugin ID of the provider client.
    pub plugin_id: String,
    /// Claims decoded from the ID token.
    pub identity_claims: IdentityClaims,
    /// Profile claims after the rewrite phase.
    pub profile_claims: ProfileClaims,
    /// The resolved subject.
    pub subject: String,
    /// True once the account was provisioned by this completion.
    pub is_new: bool,
}

/// An extension's answer to the pre-authorize phase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreAuthorize {
    /// No opinion.
    #[default]
    Abstain,
    /// Refuse the login.
    Deny,
    /// Use this account as the login target.
    Account(LocalAccount),
}

/// The combined outcome of the pre-authorize phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreAuthorizeDecision {
    /// Every extension abstained.
    Proceed,
    /// An extension denied the login.
    Deny {
        /// Name of the first denying extension.
        extension: String,
    },
    /// An extension redirected the login to an account.
    Redirect {
        /// Name of the extension whose account was adopted.
        extension: String,
        /// The adopted account.
        account: LocalAccount,
    },
}

/// Observer of the authorization flow.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name used in logs and for unregistering.
    fn name(&self) -> &str;

    /// Adds account property names that claim merge must never write.
    fn on_alter_ignored_properties(&self, _properties: &mut BTreeSet<String>) {}

    /// Rewrites the profile claims in place.
    fn on_alter_userinfo(&self, _claims: &mut ProfileClaims, _context: &UserinfoContext<'_>) {}

    /// Answers before any account is mutated.
    ///
    /// `account` is the account currently linked to the subject, if any.
    async fn on_pre_authorize(
        &self,
        _account: Option<&LocalAccount>,
        _context: &AuthorizationContext,
    ) -> PreAuthorize {
        PreAuthorize::Abstain
    }

    /// Returns false to stop merged claims from being persisted.
    async fn on_userinfo_save(
        &self,
        _account: &LocalAccount,
        _context: &AuthorizationContext,
    ) -> bool {
        true
    }

    /// Observes a completed login.
    async fn on_post_authorize(&self, _account: &LocalAccount, _context: &AuthorizationContext) {}
}

/// Ordered set of registered extensions.
///
/// Registration order is dispatch order. The registry is meant to live as
/// long as the process: register extensions during startup and call
/// [`ExtensionRegistry::clear`] on shutdown.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: RwLock<Vec<Arc<dyn Extension>>>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an extension.
    pub fn register(&self, extension: Arc<dyn Extension>) {
        debug!(extension = extension.name(), "registering extension");
        self.write().push(extension);
    }

    /// Removes every extension with this name. Returns how many were removed.
    pub fn unregister(&self, name: &str) -> usize {
        let mut extensions = self.write();
        let before = extensions.len();
        extensions.retain(|e| e.name() != name);
        before - extensions.len()
    }

    /// Removes every extension.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Returns the number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true if no extension is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the ignored-property phase.
    pub fn alter_ignored_properties(&self, properties: &mut BTreeSet<String>) {
        for extension in self.snapshot() {
            extension.on_alter_ignored_properties(properties);
        }
    }

    /// Runs the profile-rewrite phase.
    pub fn alter_userinfo(&self, claims: &mut ProfileClaims, context: &UserinfoContext<'_>) {
        for extension in self.snapshot() {
            extension.on_alter_userinfo(claims, context);
        }
    }

    /// Runs the pre-authorize phase.
    ///
    /// Every extension is asked. A `Deny` from any of them wins regardless
    /// of order; otherwise the first `Account` answer is adopted.
    pub async fn pre_authorize(
        &self,
        account: Option<&LocalAccount>,
        context: &AuthorizationContext,
    ) -> PreAuthorizeDecision {
        let mut answers = Vec::new();
        for extension in self.snapshot() {
            let answer = extension.on_pre_authorize(account, context).await;
            answers.push((extension.name().to_string(), answer));
        }

        if let Some((name, _)) = answers.iter().find(|(_, a)| *a == PreAuthorize::Deny) {
            return PreAuthorizeDecision::Deny {
                extension: name.clone(),
            };
        }

        answers
            .into_iter()
            .find_map(|(name, answer)| match answer {
                PreAuthorize::Account(account) => Some(PreAuthorizeDecision::Redirect {
                    extension: name,
                    account,
                }),
                PreAuthorize::Abstain | PreAuthorize::Deny => None,
            })
            .unwrap_or(PreAuthorizeDecision::Proceed)
    }

    /// Runs the userinfo-save phase. Returns false if any extension vetoed.
    pub async fn userinfo_save(
        &self,
        account: &LocalAccount,
        context: &AuthorizationContext,
    ) -> bool {
        let mut allowed = true;
        for extension in self.snapshot() {
            if !extension.on_userinfo_save(account, context).await {
                debug!(extension = extension.name(), "userinfo save vetoed");
                allowed = false;
            }
        }
        allowed
    }

    /// Runs the post-authorize phase.
    pub async fn post_authorize(&self, account: &LocalAccount, context: &AuthorizationContext) {
        for extension in self.snapshot() {
            extension.on_post_authorize(account, context).await;
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn Extension>> {
        match self.extensions.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                warn!("extension registry lock poisoned, using last state");
                poisoned.into_inner().clone()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Extension>>> {
        self.extensions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExtension, context_for};
    use oidc_link_core::AccountId;

    fn account(name: &str) -> LocalAccount {
        LocalAccount::new(AccountId::new(), name, format!("{name}@example.com"))
    }

    #[tokio::test]
    async fn all_abstaining_proceeds() {
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(ScriptedExtension::new("a")));
        registry.register(Arc::new(ScriptedExtension::new("b")));

        let decision = registry.pre_authorize(None, &context_for("sub")).await;

        assert_eq!(decision, PreAuthorizeDecision::Proceed);
    }

    #[tokio::test]
    async fn first_account_wins() {
        let first = account("first");
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(ScriptedExtension::new("quiet")));
        registry.register(Arc::new(
            ScriptedExtension::new("one").pre_authorize(PreAuthorize::Account(first.clone())),
        ));
        registry.register(Arc::new(
            ScriptedExtension::new("two").pre_authorize(PreAuthorize::Account(account("second"))),
        ));

        let decision = registry.pre_authorize(None, &context_for("sub")).await;

        assert_eq!(
            decision,
            PreAuthorizeDecision::Redirect {
                extension: "one".to_string(),
                account: first,
            }
        );
    }

    #[tokio::test]
    async fn deny_beats_earlier_account() {
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(
            ScriptedExtension::new("redirect").pre_authorize(PreAuthorize::Account(account("x"))),
        ));
        registry.register(Arc::new(
            ScriptedExtension::new("gate").pre_authorize(PreAuthorize::Deny),
        ));

        let decision = registry.pre_authorize(None, &context_for("sub")).await;

        assert_eq!(
            decision,
            PreAuthorizeDecision::Deny {
                extension: "gate".to_string()
            }
        );
    }

    #[tokio::test]
    async fn any_userinfo_save_veto_blocks() {
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(ScriptedExtension::new("yes")));
        registry.register(Arc::new(ScriptedExtension::new("no").userinfo_save(false)));

        assert!(!registry.userinfo_save(&account("a"), &context_for("sub")).await);
    }

    #[test]
    fn unregister_and_clear() {
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(ScriptedExtension::new("a")));
        registry.register(Arc::new(ScriptedExtension::new("b")));
        registry.register(Arc::new(ScriptedExtension::new("a")));

        assert_eq!(registry.unregister("a"), 2);
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn alter_userinfo_runs_in_registration_order() {
        let registry = ExtensionRegistry::new();
        registry.register(Arc::new(
            ScriptedExtension::new("first").set_claim("nickname", "one"),
        ));
        registry.register(Arc::new(
            ScriptedExtension::new("second").set_claim("nickname", "two"),
        ));
        let ctx = context_for("sub");
        let mut claims = ProfileClaims::new();

        registry.alter_userinfo(
            &mut claims,
            &UserinfoContext {
                tokens: &ctx.tokens,
                plugin_id: &ctx.plugin_id,
                identity_claims: &ctx.identity_claims,
            },
        );

        assert_eq!(claims.get_str("nickname"), Some("two"));
    }
}
