//! The identity provider client boundary.
//!
//! The OAuth2 wire protocol lives behind [`ProviderClient`]: redirect
//! construction, the token exchange, ID token verification and the
//! UserInfo request. Every method reports failure as `None`; the engine
//! turns that into a logged rejection.

use crate::claims::{IdentityClaims, ProfileClaims, TokenBundle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scopes requested from every provider.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email"];

/// A provider's endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// Authorization endpoint.
    pub authorization: String,
    /// Token endpoint.
    pub token: String,
    /// UserInfo endpoint.
    pub userinfo: String,
}

/// Where to send the browser to start a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// The provider URL to redirect to.
    pub location: String,
}

/// A configured client of one identity provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Plugin ID of the client, e.g. `keycloak`. Used in logs and messages.
    fn plugin_id(&self) -> &str;

    /// Name of the configured client. Links are keyed by it.
    fn client_name(&self) -> &str;

    /// Human-readable provider label for user-facing messages.
    fn label(&self) -> &str {
        self.plugin_id()
    }

    /// Returns the provider's endpoints.
    fn endpoints(&self) -> Endpoints;

    /// Scopes this provider needs on top of [`DEFAULT_SCOPES`].
    fn client_scopes(&self) -> Option<Vec<String>> {
        None
    }

    /// Builds the redirect to the authorization endpoint.
    fn authorize(&self, scope: &str) -> AuthorizationRedirect;

    /// Exchanges an authorization code for tokens.
    async fn retrieve_tokens(&self, code: &str) -> Option<TokenBundle>;

    /// Verifies and decodes an ID token.
    async fn decode_id_token(&self, id_token: &str) -> Option<IdentityClaims>;

    /// Fetches the UserInfo claims.
    async fn retrieve_userinfo(&self, access_token: &str) -> Option<ProfileClaims>;
}

/// Returns the space-separated scope string to request from a provider.
///
/// [`DEFAULT_SCOPES`] come first, followed by the client's own scopes in
/// order, without duplicates.
#[must_use]
pub fn requested_scopes<C: ProviderClient + ?Sized>(client: &C) -> String {
    let mut scopes: Vec<String> = DEFAULT_SCOPES.iter().map(ToString::to_string).collect();
    for scope in client.client_scopes().unwrap_or_default() {
        if !scope.is_empty() && !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    scopes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    #[test]
    fn defaults_without_client_scopes() {
        let client = ScriptedProvider::new("keycloak");
        assert_eq!(requested_scopes(&client), "openid email");
    }

    #[test]
    fn client_scopes_are_appended_once() {
        let client = ScriptedProvider::new("keycloak").with_scopes(vec![
            "profile".to_string(),
            "email".to_string(),
            "groups".to_string(),
            "profile".to_string(),
        ]);

        assert_eq!(requested_scopes(&client), "openid email profile groups");
    }

    #[test]
    fn authorize_receives_scope_string() {
        let client = ScriptedProvider::new("keycloak");
        let redirect = client.authorize(&requested_scopes(&client));
        assert!(redirect.location.contains("scope=openid email"));
    }
}
