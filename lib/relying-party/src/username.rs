//! Local account name derivation.
//!
//! The default name is `oidc_<client>_<md5(subject)>`: stable for a given
//! subject and traceable to the provider even when the profile carries no
//! name at all. A `preferred_username` claim overrides it, and a `name`
//! claim overrides both.

use crate::claims::ProfileClaims;
use crate::error::ProvisionError;
use crate::store::AccountStore;
use md5::{Digest, Md5};
use tracing::debug;

/// Tag prepended to generated account names.
pub const NAMESPACE_TAG: &str = "oidc";

/// Default bound on suffix probing.
pub const DEFAULT_MAX_ATTEMPTS: usize = 100;

/// Returns the unsuffixed candidate name for a subject.
///
/// Deterministic: identical inputs always produce the same candidate.
#[must_use]
pub fn candidate_username(subject: &str, profile: &ProfileClaims, client_name: &str) -> String {
    let mut candidate = format!(
        "{NAMESPACE_TAG}_{client_name}_{}",
        hex::encode(Md5::digest(subject.as_bytes()))
    );

    for claim in ["preferred_username", "name"] {
        if let Some(value) = profile.get_str(claim).map(str::trim).filter(|v| !v.is_empty()) {
            candidate = value.to_string();
        }
    }

    candidate
}

/// Returns the name tried at `attempt`: the base for 0, `base_<n>` after.
#[must_use]
pub fn suffixed(base: &str, attempt: usize) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}_{attempt}")
    }
}

/// Finds the first free name starting at suffix `from`.
///
/// Tries `base`, `base_1`, `base_2`, ... in order and returns the free
/// name together with the attempt index it was found at. The check is
/// advisory; the store's own uniqueness constraint is authoritative.
///
/// # Errors
///
/// Returns [`ProvisionError::UsernameExhausted`] once `max_attempts`
/// names have been tried.
pub async fn next_free_username<S: AccountStore + ?Sized>(
    store: &S,
    base: &str,
    from: usize,
    max_attempts: usize,
) -> Result<(String, usize), ProvisionError> {
    for attempt in from..max_attempts {
        let name = suffixed(base, attempt);
        if store.find_by_name(&name).await?.is_none() {
            return Ok((name, attempt));
        }
        debug!(name = %name, "account name taken, trying next suffix");
    }

    Err(ProvisionError::UsernameExhausted {
        base: base.to_string(),
        attempts: max_attempts,
    })
}

/// Derives a free account name for a subject.
///
/// # Errors
///
/// Returns an error if the store fails or no free name exists within
/// `max_attempts` names.
pub async fn allocate_username<S: AccountStore + ?Sized>(
    store: &S,
    subject: &str,
    profile: &ProfileClaims,
    client_name: &str,
    max_attempts: usize,
) -> Result<String, ProvisionError> {
    let base = candidate_username(subject, profile, client_name);
    next_free_username(store, &base, 0, max_attempts)
        .await
        .map(|(name, _)| name)
}
