//! Local password change authorization.
//!
//! Letting a federated account set a local password would give it a second
//! way in that bypasses the provider, so it is only allowed with an
//! explicit permission.

use crate::error::StoreError;
use crate::principal::{Principal, SET_OWN_PASSWORD_PERMISSION};
use crate::store::LinkStore;
use oidc_link_core::Result;
use tracing::debug;

/// Decides whether a principal may set a local password.
///
/// `account` is the principal being checked; `None` checks `current`.
/// Holders of [`SET_OWN_PASSWORD_PERMISSION`] may always set one. Anyone
/// else may only if their account holds no provider links. Anonymous
/// principals never may.
///
/// # Errors
///
/// Returns an error if the link store fails.
pub async fn can_set_local_password<L: LinkStore + ?Sized>(
    links: &L,
    current: &Principal,
    account: Option<&Principal>,
) -> Result<bool, StoreError> {
    let principal = account.unwrap_or(current);

    if principal.has_permission(SET_OWN_PASSWORD_PERMISSION) {
        return Ok(true);
    }

    let Some(account_id) = principal.account_id() else {
        return Ok(false);
    };

    let connected = links.links_for(account_id).await?;
    debug!(
        account_id = %account_id,
        links = connected.len(),
        "checked provider links for local password change"
    );
    Ok(connected.is_empty())
}
