//! Claim sets returned by the identity provider.
//!
//! Two claim sets arrive for every login: the decoded ID token
//! ([`IdentityClaims`]) and the UserInfo endpoint response
//! ([`ProfileClaims`]). Either may be empty when the provider fails.
//! [`resolve_subject`] reconciles them into the single subject that the
//! rest of the flow trusts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use validator::ValidateEmail;

/// A mapping of claim name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, JsonValue>);

/// Claims decoded from the ID token (`iss`, `sub`, `aud`, `exp`, `iat`, ...).
pub type IdentityClaims = Claims;

/// Claims returned by the UserInfo endpoint (`sub`, `email`, `name`, ...).
pub type ProfileClaims = Claims;

impl Claims {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a claim, returning the previous value.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Option<JsonValue> {
        self.0.insert(name.into(), value.into())
    }

    /// Removes a claim, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        self.0.remove(name)
    }

    /// Returns the raw value of a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    /// Returns a claim as a string slice, if it is a JSON string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(JsonValue::as_str)
    }

    /// Returns a claim as a boolean, if it is a JSON boolean.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(JsonValue::as_bool)
    }

    /// Returns true if the claim is present with a non-null value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    /// Returns the `sub` claim when it is a non-empty string.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub").filter(|s| !s.is_empty())
    }

    /// Returns the `email` claim when it is a non-empty string.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get_str("email").filter(|s| !s.is_empty())
    }

    /// Returns true if no claims are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over claim names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

impl From<Map<String, JsonValue>> for Claims {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for Claims {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Tokens obtained from the provider's token endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    /// The encoded ID token.
    pub id_token: String,
    /// The access token used against the UserInfo endpoint.
    pub access_token: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl TokenBundle {
    /// Creates a token bundle.
    #[must_use]
    pub fn new(
        id_token: impl Into<String>,
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id_token: id_token.into(),
            access_token: access_token.into(),
            expires_at,
        }
    }
}

impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("id_token", &"<redacted>")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Reconciles the two claim sets into a single trusted subject.
///
/// Returns `None` when neither set carries a subject, or when both carry
/// one and they differ. A mismatch is never resolved by picking a side.
#[must_use]
pub fn resolve_subject(identity: &IdentityClaims, profile: &ProfileClaims) -> Option<String> {
    match (identity.subject(), profile.subject()) {
        (None, None) => None,
        (Some(sub), None) | (None, Some(sub)) => Some(sub.to_string()),
        (Some(a), Some(b)) if a == b => Some(a.to_string()),
        (Some(_), Some(_)) => None,
    }
}

/// Syntactic e-mail check applied before matching local accounts.
///
/// Uses the HTML5 address grammar, so single-label domains such as
/// `localhost` are accepted.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn with_sub(sub: &str) -> Claims {
        Claims::new().with("sub", sub)
    }

    #[rstest]
    #[case::neither(Claims::new(), Claims::new(), None)]
    #[case::identity_only(with_sub("abc"), Claims::new(), Some("abc"))]
    #[case::profile_only(Claims::new(), with_sub("X"), Some("X"))]
    #[case::both_equal(with_sub("abc"), with_sub("abc"), Some("abc"))]
    #[case::both_differ(with_sub("A"), with_sub("B"), None)]
    #[case::empty_identity_sub(with_sub(""), with_sub("B"), Some("B"))]
    fn resolves_subject(
        #[case] identity: Claims,
        #[case] profile: Claims,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(resolve_subject(&identity, &profile).as_deref(), expected);
    }

    #[test]
    fn subject_comparison_is_exact() {
        assert_eq!(resolve_subject(&with_sub("abc"), &with_sub("ABC")), None);
        assert_eq!(resolve_subject(&with_sub("abc"), &with_sub("abc ")), None);
    }

    #[test]
    fn non_string_sub_is_ignored() {
        let identity = Claims::new().with("sub", 42);
        assert_eq!(resolve_subject(&identity, &Claims::new()), None);
    }

    #[test]
    fn email_accessor_skips_empty() {
        assert_eq!(Claims::new().with("email", "").email(), None);
        assert_eq!(
            Claims::new().with("email", "a@example.com").email(),
            Some("a@example.com")
        );
    }

    #[test]
    fn contains_ignores_null() {
        let claims = Claims::new().with("name", JsonValue::Null);
        assert!(!claims.contains("name"));
        assert!(!claims.is_empty());
    }

    #[test]
    fn claims_deserialize_from_object() {
        let claims: Claims =
            serde_json::from_value(json!({"sub": "s1", "blocked": true})).expect("deserialize");
        assert_eq!(claims.subject(), Some("s1"));
        assert_eq!(claims.get_bool("blocked"), Some(true));
        assert_eq!(claims.len(), 2);
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last@mail.example.org", true)]
    #[case("invalid", false)]
    #[case("@example.com", false)]
    #[case("user@", false)]
    #[case("user@localhost", true)]
    #[case("user@@example.com", false)]
    #[case("us er@example.com", false)]
    #[case("user@example..com", false)]
    #[case("", false)]
    fn validates_email(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn token_bundle_debug_redacts_tokens() {
        let tokens = TokenBundle::new("id.secret", "access-secret", Utc::now());
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("secret"));
    }
}
