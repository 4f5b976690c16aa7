//! Site registration and linking policy.
//!
//! A [`SitePolicy`] is supplied per authorization completion and never
//! mutated by this crate. It can be built in code or loaded from the
//! environment:
//!
//! ```text
//! OIDC_POLICY__REGISTRATION_MODE=admin_approval
//! OIDC_POLICY__CONNECT_EXISTING_USERS=true
//! OIDC_POLICY__CLAIM_TO_PROPERTY_MAP__GIVEN_NAME=first_name
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment variable prefix used by [`SitePolicy::from_env`].
pub const ENV_PREFIX: &str = "OIDC_POLICY";

/// Who may create an account by logging in with a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationMode {
    /// Visitors may register.
    Open,
    /// Only administrators may register accounts.
    #[default]
    AdminOnly,
    /// Visitors may register, but new accounts stay blocked until approved.
    AdminApproval,
}

impl RegistrationMode {
    /// Applies the policy override.
    ///
    /// The override only opens an admin-only site; approval is still
    /// required on an admin-approval site.
    #[must_use]
    pub fn with_override(self, allow_override: bool) -> Self {
        match self {
            Self::AdminOnly if allow_override => Self::Open,
            mode => mode,
        }
    }
}

/// Registration and linking policy.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePolicy {
    /// Default: `admin_only`
    #[serde(default)]
    registration_mode: RegistrationMode,
    /// Link a new subject to an existing account with the same e-mail.
    /// Default: false
    #[serde(default)]
    connect_existing_users: bool,
    /// Merge claims on every login, not just the first.
    /// Default: false
    #[serde(default)]
    always_save_userinfo: bool,
    /// Claim name to account property name.
    /// Default: `zoneinfo` to `timezone`
    #[serde(default = "default_claim_to_property_map")]
    claim_to_property_map: BTreeMap<String, String>,
    /// Let OIDC logins register on an admin-only site.
    /// Default: false
    #[serde(default)]
    allow_policy_override: bool,
}

fn default_claim_to_property_map() -> BTreeMap<String, String> {
    BTreeMap::from([("zoneinfo".to_string(), "timezone".to_string())])
}

impl Default for SitePolicy {
    fn default() -> Self {
        Self {
            registration_mode: RegistrationMode::default(),
            connect_existing_users: false,
            always_save_userinfo: false,
            claim_to_property_map: default_claim_to_property_map(),
            allow_policy_override: false,
        }
    }
}

impl SitePolicy {
    /// Creates a policy builder starting from the defaults.
    #[must_use]
    pub fn builder() -> SitePolicyBuilder {
        SitePolicyBuilder::default()
    }

    /// Loads the policy from `OIDC_POLICY__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed into its field.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(source: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(source.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the configured registration mode.
    #[must_use]
    pub fn registration_mode(&self) -> RegistrationMode {
        self.registration_mode
    }

    /// Returns the registration mode after applying the override.
    #[must_use]
    pub fn effective_registration_mode(&self) -> RegistrationMode {
        self.registration_mode.with_override(self.allow_policy_override)
    }

    /// Returns true if subjects may be linked to existing accounts by e-mail.
    #[must_use]
    pub fn connect_existing_users(&self) -> bool {
        self.connect_existing_users
    }

    /// Returns true if claims are merged on every login.
    #[must_use]
    pub fn always_save_userinfo(&self) -> bool {
        self.always_save_userinfo
    }

    /// Returns the claim-to-property mapping.
    #[must_use]
    pub fn claim_to_property_map(&self) -> &BTreeMap<String, String> {
        &self.claim_to_property_map
    }

    /// Returns true if the policy override is allowed.
    #[must_use]
    pub fn allow_policy_override(&self) -> bool {
        self.allow_policy_override
    }
}

/// Builder for `SitePolicy`.
#[derive(Debug, Default)]
pub struct SitePolicyBuilder {
    policy: SitePolicy,
}

impl SitePolicyBuilder {
    /// Sets the registration mode.
    #[must_use]
    pub fn registration_mode(mut self, mode: RegistrationMode) -> Self {
        self.policy.registration_mode = mode;
        self
    }

    /// Sets whether subjects may be linked to existing accounts by e-mail.
    #[must_use]
    pub fn connect_existing_users(mut self, enabled: bool) -> Self {
        self.policy.connect_existing_users = enabled;
        self
    }

    /// Sets whether claims are merged on every login.
    #[must_use]
    pub fn always_save_userinfo(mut self, enabled: bool) -> Self {
        self.policy.always_save_userinfo = enabled;
        self
    }

    /// Replaces the claim-to-property mapping.
    #[must_use]
    pub fn claim_to_property_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.policy.claim_to_property_map = map;
        self
    }

    /// Adds or replaces one claim mapping.
    #[must_use]
    pub fn map_claim(mut self, claim: impl Into<String>, property: impl Into<String>) -> Self {
        self.policy
            .claim_to_property_map
            .insert(claim.into(), property.into());
        self
    }

    /// Sets whether the policy override is allowed.
    #[must_use]
    pub fn allow_policy_override(mut self, enabled: bool) -> Self {
        self.policy.allow_policy_override = enabled;
        self
    }

    /// Builds the `SitePolicy`.
    #[must_use]
    pub fn build(self) -> SitePolicy {
        self.policy
    }
}
