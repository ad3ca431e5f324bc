//! In-memory identity provider
//!
//! Scriptable stand-in for a real identity-provider client. Used by the
//! `explain` command and by hosts that want to exercise their route table
//! without a running realm.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use tracing::debug;

use super::{IdentityProvider, InitOptions, LoginOptions, UserProfile};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct IssuedToken {
    value: String,
    expires_at: u64,
}

#[derive(Debug)]
struct State {
    logged_in: bool,
    subject: String,
    username: String,
    roles: Vec<String>,
    token: Option<IssuedToken>,
    token_lifetime: Duration,
    init_failure: Option<String>,
    refuse_refresh: bool,
    refresh_failure: Option<String>,
    login_redirects: Vec<String>,
    logout_redirects: Vec<String>,
}

/// Identity provider backed by an in-process record
pub struct MemoryIdentityProvider {
    state: Mutex<State>,
    refresh_delay: Duration,
    issued: AtomicUsize,
}

impl MemoryIdentityProvider {
    /// Provider without a session
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            state: Mutex::new(State {
                logged_in: false,
                subject: String::new(),
                username: String::new(),
                roles: Vec::new(),
                token: None,
                token_lifetime: Duration::from_secs(300),
                init_failure: None,
                refuse_refresh: false,
                refresh_failure: None,
                login_redirects: Vec::new(),
                logout_redirects: Vec::new(),
            }),
            refresh_delay: Duration::ZERO,
            issued: AtomicUsize::new(0),
        }
    }

    /// Provider with an existing session for `username` holding `roles`
    #[must_use]
    pub fn signed_in<I, S>(username: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::anonymous();
        {
            let mut state = provider.state.lock();
            state.logged_in = true;
            state.subject = format!("{username}-id");
            state.username = username.to_string();
            state.roles = roles.into_iter().map(Into::into).collect();
        }
        provider
    }

    /// Make `init` fail as if the provider were unreachable
    #[must_use]
    pub fn with_init_failure(self, reason: &str) -> Self {
        self.state.lock().init_failure = Some(reason.to_string());
        self
    }

    /// Lifetime of issued tokens (default five minutes)
    #[must_use]
    pub fn with_token_lifetime(self, lifetime: Duration) -> Self {
        self.set_token_lifetime(lifetime);
        self
    }

    /// Change the lifetime of tokens issued from now on
    pub fn set_token_lifetime(&self, lifetime: Duration) {
        self.state.lock().token_lifetime = lifetime;
    }

    /// Delay every token issuance, simulating a refresh round trip
    #[must_use]
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Refuse further renewals; the session ends on the next refresh
    pub fn refuse_refresh(&self) {
        self.state.lock().refuse_refresh = true;
    }

    /// Fail renewals as if the provider were unreachable, keeping its
    /// session; `None` restores normal renewals
    pub fn fail_refresh_with(&self, reason: Option<&str>) {
        self.state.lock().refresh_failure = reason.map(str::to_string);
    }

    /// Drop the current token so the next `get_token` issues a new one
    pub fn rotate(&self) {
        self.state.lock().token = None;
    }

    /// Number of tokens issued so far
    pub fn tokens_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Redirect URIs passed to `login`, oldest first
    pub fn login_redirects(&self) -> Vec<String> {
        self.state.lock().login_redirects.clone()
    }

    /// Redirect URIs passed to `logout`, oldest first
    pub fn logout_redirects(&self) -> Vec<String> {
        self.state.lock().logout_redirects.clone()
    }

    fn issue(&self, state: &mut State) -> IssuedToken {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = now_secs() + state.token_lifetime.as_secs();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({
                "sub": state.subject,
                "exp": expires_at,
                "preferred_username": state.username,
                "realm_access": { "roles": state.roles },
            })
            .to_string(),
        );
        let token = IssuedToken {
            value: format!("{header}.{payload}.memory-{n}"),
            expires_at,
        };
        state.token = Some(token.clone());
        token
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn init(&self, options: &InitOptions) -> Result<bool> {
        let state = self.state.lock();
        if let Some(reason) = &state.init_failure {
            return Err(Error::ProviderUnavailable(reason.clone()));
        }
        debug!(realm = %options.realm, logged_in = state.logged_in, "Memory provider initialized");
        Ok(state.logged_in)
    }

    async fn login(&self, options: &LoginOptions) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.init_failure {
            return Err(Error::ProviderUnavailable(reason.clone()));
        }
        state.login_redirects.push(options.redirect_uri.clone());
        Ok(())
    }

    async fn logout(&self, redirect_uri: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.logged_in = false;
        state.token = None;
        state.logout_redirects.push(redirect_uri.to_string());
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.state.lock().logged_in
    }

    async fn get_token(&self, min_validity: Duration) -> Result<String> {
        {
            let state = self.state.lock();
            if !state.logged_in {
                return Err(Error::NotAuthenticated);
            }
            if let Some(token) = &state.token {
                if now_secs() + min_validity.as_secs() < token.expires_at {
                    return Ok(token.value.clone());
                }
            }
        }

        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }

        let mut state = self.state.lock();
        if state.refuse_refresh {
            state.logged_in = false;
            state.token = None;
            return Err(Error::NotAuthenticated);
        }
        if let Some(reason) = &state.refresh_failure {
            return Err(Error::ProviderUnavailable(reason.clone()));
        }
        Ok(self.issue(&mut state).value)
    }

    fn get_user_roles(&self) -> Vec<String> {
        let state = self.state.lock();
        if state.logged_in {
            state.roles.clone()
        } else {
            Vec::new()
        }
    }

    async fn load_user_profile(&self) -> Result<UserProfile> {
        let state = self.state.lock();
        if !state.logged_in {
            return Err(Error::NotAuthenticated);
        }
        Ok(UserProfile {
            id: Some(state.subject.clone()),
            username: Some(state.username.clone()),
            email: Some(format!("{}@example.com", state.username)),
            ..UserProfile::default()
        })
    }

    fn username(&self) -> Option<String> {
        let state = self.state.lock();
        state.logged_in.then(|| state.username.clone())
    }
}
