//! Scripted collaborators for tests.

use crate::account::LocalAccount;
use crate::claims::{Claims, IdentityClaims, ProfileClaims, TokenBundle};
use crate::extension::{AuthorizationContext, Extension, PreAuthorize, UserinfoContext};
use crate::messaging::Messenger;
use crate::provider::{AuthorizationRedirect, Endpoints, ProviderClient};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

pub fn tokens() -> TokenBundle {
    TokenBundle::new("id.token", "access-token", Utc::now() + Duration::hours(1))
}

pub fn context_for(subject: &str) -> AuthorizationContext {
    AuthorizationContext {
        tokens: tokens(),
        plugin_id: "keycloak".to_string(),
        identity_claims: Claims::new().with("sub", subject),
        profile_claims: Claims::new().with("sub", subject),
        subject: subject.to_string(),
        is_new: false,
    }
}

/// Formatted `tracing` output captured on the current thread.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Routes this thread's events here until the guard drops.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_writer(self.clone())
                .with_ansi(false)
                .without_time(),
        );
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(ToString::to_string)
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|line| line.starts_with("ERROR"))
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Provider client returning canned answers.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    plugin_id: String,
    scopes: Option<Vec<String>>,
    tokens: Option<TokenBundle>,
    identity: Option<IdentityClaims>,
    profile: Option<ProfileClaims>,
}

impl ScriptedProvider {
    pub fn new(plugin_id: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            scopes: None,
            tokens: Some(tokens()),
            identity: Some(Claims::new()),
            profile: Some(Claims::new()),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = Some(scopes);
        self
    }

    pub fn with_identity(mut self, claims: IdentityClaims) -> Self {
        self.identity = Some(claims);
        self
    }

    pub fn with_profile(mut self, claims: ProfileClaims) -> Self {
        self.profile = Some(claims);
        self
    }

    pub fn without_tokens(mut self) -> Self {
        self.tokens = None;
        self
    }

    pub fn without_userinfo(mut self) -> Self {
        self.profile = None;
        self
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    fn client_name(&self) -> &str {
        &self.plugin_id
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            authorization: "https://idp.example.com/auth".to_string(),
            token: "https://idp.example.com/token".to_string(),
            userinfo: "https://idp.example.com/userinfo".to_string(),
        }
    }

    fn client_scopes(&self) -> Option<Vec<String>> {
        self.scopes.clone()
    }

    fn authorize(&self, scope: &str) -> AuthorizationRedirect {
        AuthorizationRedirect {
            location: format!("{}?scope={scope}", self.endpoints().authorization),
        }
    }

    async fn retrieve_tokens(&self, _code: &str) -> Option<TokenBundle> {
        self.tokens.clone()
    }

    async fn decode_id_token(&self, _id_token: &str) -> Option<IdentityClaims> {
        self.identity.clone()
    }

    async fn retrieve_userinfo(&self, _access_token: &str) -> Option<ProfileClaims> {
        self.profile.clone()
    }
}

/// Messenger that records every notice.
#[derive(Debug, Clone, Default)]
pub struct RecordingMessenger {
    errors: Arc<Mutex<Vec<String>>>,
    infos: Arc<Mutex<Vec<String>>>,
}

impl RecordingMessenger {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }
}

impl Messenger for RecordingMessenger {
    fn notify_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn notify_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }
}

/// Extension with canned answers that counts its post-authorize calls.
#[derive(Debug, Default)]
pub struct ScriptedExtension {
    name: String,
    pre_authorize: PreAuthorize,
    userinfo_save: Option<bool>,
    set_claims: Vec<(String, JsonValue)>,
    ignore: Vec<String>,
    clear_ignored: bool,
    post_authorize_calls: AtomicUsize,
    last_is_new: Mutex<Option<bool>>,
}

impl ScriptedExtension {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn pre_authorize(mut self, answer: PreAuthorize) -> Self {
        self.pre_authorize = answer;
        self
    }

    pub fn userinfo_save(mut self, allow: bool) -> Self {
        self.userinfo_save = Some(allow);
        self
    }

    pub fn set_claim(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        self.set_claims.push((name.to_string(), value.into()));
        self
    }

    pub fn ignore_property(mut self, name: &str) -> Self {
        self.ignore.push(name.to_string());
        self
    }

    pub fn clear_ignored(mut self) -> Self {
        self.clear_ignored = true;
        self
    }

    pub fn post_authorize_calls(&self) -> usize {
        self.post_authorize_calls.load(Ordering::SeqCst)
    }

    pub fn last_is_new(&self) -> Option<bool> {
        *self.last_is_new.lock().unwrap()
    }
}

#[async_trait]
impl Extension for ScriptedExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_alter_ignored_properties(&self, properties: &mut BTreeSet<String>) {
        if self.clear_ignored {
            properties.clear();
        }
        properties.extend(self.ignore.iter().cloned());
    }

    fn on_alter_userinfo(&self, claims: &mut ProfileClaims, _context: &UserinfoContext<'_>) {
        for (name, value) in &self.set_claims {
            claims.insert(name.clone(), value.clone());
        }
    }

    async fn on_pre_authorize(
        &self,
        _account: Option<&LocalAccount>,
        _context: &AuthorizationContext,
    ) -> PreAuthorize {
        self.pre_authorize.clone()
    }

    async fn on_userinfo_save(
        &self,
        _account: &LocalAccount,
        _context: &AuthorizationContext,
    ) -> bool {
        self.userinfo_save.unwrap_or(true)
    }

    async fn on_post_authorize(&self, _account: &LocalAccount, context: &AuthorizationContext) {
        self.post_authorize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_is_new.lock().unwrap() = Some(context.is_new);
    }
}
