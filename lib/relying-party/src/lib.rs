//! Identity reconciliation for an OpenID Connect relying party.
//!
//! Given the tokens and claims returned by an identity provider, this crate
//! decides which local account the user is: one already linked to the
//! provider subject, an existing account that should be connected by
//! e-mail, or a brand-new account. Site registration and linking policy is
//! enforced throughout, and extensions can observe or steer each phase.
//!
//! # Entry points
//!
//! - [`AuthorizationEngine::complete_from_code`] / [`AuthorizationEngine::complete_authorization`]
//! - [`can_set_local_password`]
//! - [`requested_scopes`]
//!
//! The provider wire protocol, account storage, and session handling are
//! collaborators behind the traits in [`provider`], [`store`], and
//! [`messaging`].

pub mod account;
pub mod claims;
pub mod engine;
pub mod error;
pub mod extension;
pub mod memory;
pub mod messaging;
pub mod password;
pub mod policy;
pub mod principal;
pub mod properties;
pub mod provider;
pub mod provisioner;
pub mod store;
pub mod username;

#[cfg(test)]
mod testing;

pub use account::{AccountStatus, LocalAccount, NewAccount, ProviderLink};
pub use claims::{Claims, IdentityClaims, ProfileClaims, TokenBundle, resolve_subject};
pub use engine::{AuthorizationEngine, Completion, Rejection};
pub use error::{AuthorizationError, ProvisionError, StoreError};
pub use extension::{
    AuthorizationContext, Extension, ExtensionRegistry, PreAuthorize, UserinfoContext,
};
pub use messaging::{LogMessenger, Messenger};
pub use password::can_set_local_password;
pub use policy::{RegistrationMode, SitePolicy};
pub use principal::{AuthenticatedPrincipal, Principal, SET_OWN_PASSWORD_PERMISSION};
pub use properties::{IgnoredProperties, ignored_properties};
pub use provider::{ProviderClient, requested_scopes};
pub use provisioner::{AccountProvisioner, Provisioned};
pub use store::{AccountStore, LinkEntry, LinkStore};
pub use username::allocate_username;
