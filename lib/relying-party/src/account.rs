//! Local account domain types.
//!
//! A [`LocalAccount`] is the site's own record of a user. Accounts are
//! owned by the account store; this crate creates them through the
//! provisioner and mutates them during claim merge, but never deletes them.

use chrono::{DateTime, Utc};
use oidc_link_core::AccountId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Whether an account may log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// The account may log in.
    Active,
    /// The account is blocked or still awaiting administrator approval.
    Blocked,
}

impl AccountStatus {
    /// Maps an `active` flag to a status.
    #[must_use]
    pub fn from_active(active: bool) -> Self {
        if active { Self::Active } else { Self::Blocked }
    }
}

/// The provider client and subject recorded on an account at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderLink {
    /// Name of the provider client that created the account.
    pub client_name: String,
    /// The subject the account was created for.
    pub subject: String,
}

impl ProviderLink {
    /// Creates provider link metadata.
    #[must_use]
    pub fn new(client_name: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            subject: subject.into(),
        }
    }
}

/// A generated local password.
///
/// Federated accounts never log in with it; it exists because the account
/// store requires every account to carry one. It is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalPassword(String);

impl LocalPassword {
    /// Wraps a password value.
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns the secret, for the store to hash.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LocalPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalPassword(<redacted>)")
    }
}

/// Everything the account store needs to create an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Pre-generated identifier.
    pub id: AccountId,
    /// Unique account name.
    pub name: String,
    /// Local password to hash and store.
    pub password: LocalPassword,
    /// Current e-mail address.
    pub email: String,
    /// E-mail address used at registration.
    pub init_email: String,
    /// Initial status.
    pub status: AccountStatus,
    /// Provider client and subject that caused the creation.
    pub provider_link: ProviderLink,
}

/// A local account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    id: AccountId,
    name: String,
    email: String,
    init_email: String,
    status: AccountStatus,
    roles: Vec<String>,
    /// IANA timezone name.
    timezone: Option<String>,
    provider_link: Option<ProviderLink>,
    /// Site-specific profile fields declared by the store. Only these and
    /// `timezone` accept claim values.
    fields: BTreeMap<String, JsonValue>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LocalAccount {
    /// Creates an active account with no roles or profile fields.
    ///
    /// Use this when reconstituting an account from storage, followed by
    /// the `with_*` methods.
    #[must_use]
    pub fn new(id: AccountId, name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        let email = email.into();
        Self {
            id,
            name: name.into(),
            init_email: email.clone(),
            email,
            status: AccountStatus::Active,
            roles: Vec::new(),
            timezone: None,
            provider_link: None,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Materializes a freshly created account.
    #[must_use]
    pub fn from_new(new: NewAccount) -> Self {
        let now = Utc::now();
        Self {
            id: new.id,
            name: new.name,
            email: new.email,
            init_email: new.init_email,
            status: new.status,
            roles: Vec::new(),
            timezone: None,
            provider_link: Some(new.provider_link),
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }

    /// Declares a site-specific profile field that claims may populate.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_insert(JsonValue::Null);
        self
    }

    /// Sets the registration e-mail.
    #[must_use]
    pub fn with_init_email(mut self, init_email: impl Into<String>) -> Self {
        self.init_email = init_email.into();
        self
    }

    /// Returns the account ID.
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Returns the unique account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current e-mail address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the e-mail address used at registration.
    #[must_use]
    pub fn init_email(&self) -> &str {
        &self.init_email
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Returns true if the account is blocked or awaiting approval.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == AccountStatus::Blocked
    }

    /// Returns the roles.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns the timezone, if set.
    #[must_use]
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    /// Returns the provider link recorded at creation, if any.
    #[must_use]
    pub fn provider_link(&self) -> Option<&ProviderLink> {
        self.provider_link.as_ref()
    }

    /// Returns a site-specific profile field, if declared and set.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// Returns true if claim merge may write this property.
    #[must_use]
    pub fn has_property(&self, property: &str) -> bool {
        property == "timezone" || self.fields.contains_key(property)
    }

    /// Returns when the account was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the account was last updated.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: AccountStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Sets a mergeable property from a claim value.
    ///
    /// `timezone` must be a string. Declared profile fields take any value.
    /// Identity properties and undeclared names are never written. Returns
    /// false if the property or value was rejected.
    pub fn set_property(&mut self, property: &str, value: &JsonValue) -> bool {
        match property {
            "timezone" => match value.as_str() {
                Some(tz) => self.timezone = Some(tz.to_string()),
                None => return false,
            },
            _ => match self.fields.get_mut(property) {
                Some(field) => *field = value.clone(),
                None => return false,
            },
        }
        self.updated_at = Utc::now();
        true
    }
}
