//! Credential provider
//!
//! Single source of truth for the session. Bridges the injected
//! [`IdentityProvider`] and caches its token so outbound calls don't pay a
//! provider round trip each time.
//!
//! # State machine
//!
//! ```text
//!                    login (redirect, restart)
//!   Unauthenticated ───────────────────────────▶ Authenticated
//!          ▲                                          │
//!          └──────── logout / refresh refused ────────┘
//! ```
//!
//! The initial state comes from the silent session check in
//! [`CredentialProvider::bootstrap`]. There is no public constructor that
//! skips it, so nothing can query an unchecked session.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::TokenClaims;
use crate::config::Config;
use crate::identity::{IdentityProvider, InitOptions, LoginOptions, UserProfile};
use crate::headers::auth_header;
use crate::session::{CachedToken, Session};
use crate::storage::{PendingLogin, RedirectStore};
use crate::{Error, Result};

/// Outcome of the startup session check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    /// The check completed
    Ready,
    /// The check was skipped by configuration
    Bypassed,
    /// The provider could not be reached; the session is anonymous
    Failed(String),
}

/// A browser redirect that has been issued.
///
/// Whatever flow produced it is over; the application continues after the
/// redirect comes back, with a fresh process and the session pre-populated.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a redirect ends the current flow"]
pub struct Redirect {
    /// Where the user agent is being sent back to afterwards
    pub return_uri: String,
}

/// Owner of the session record
pub struct CredentialProvider {
    idp: Arc<dyn IdentityProvider>,
    config: Arc<Config>,
    session: RwLock<Session>,
    init_state: InitState,
    refresh_lock: Mutex<()>,
    redirects: Option<RedirectStore>,
}

impl CredentialProvider {
    /// Run the silent session check and return the ready provider.
    ///
    /// Never fails: an unreachable provider yields [`InitState::Failed`] and
    /// an anonymous session, which every later check treats as logged out.
    pub async fn bootstrap(
        idp: Arc<dyn IdentityProvider>,
        config: Arc<Config>,
        redirects: Option<RedirectStore>,
    ) -> Arc<Self> {
        let mut provider = Self {
            idp,
            config,
            session: RwLock::new(Session::anonymous()),
            init_state: InitState::Ready,
            refresh_lock: Mutex::new(()),
            redirects,
        };

        provider.init_state = if provider.config.provider.skip_session_check {
            info!("Silent session check skipped by configuration");
            if provider.idp.is_logged_in() {
                if let Err(e) = provider.resync().await {
                    warn!(error = %e, "Could not adopt existing provider session");
                }
            }
            InitState::Bypassed
        } else {
            provider.silent_check().await
        };

        Arc::new(provider)
    }

    async fn silent_check(&self) -> InitState {
        let options = InitOptions::from_config(&self.config);
        match self.idp.init(&options).await {
            Ok(true) => match self.resync().await {
                Ok(_) => InitState::Ready,
                Err(Error::NotAuthenticated) => {
                    info!("Provider reported a session but issued no token");
                    InitState::Ready
                }
                Err(e) => {
                    warn!(error = %e, "Session check failed while loading the session");
                    InitState::Failed(e.to_string())
                }
            },
            Ok(false) => {
                debug!(realm = %options.realm, "No existing session");
                InitState::Ready
            }
            Err(e) => {
                warn!(realm = %options.realm, error = %e, "Silent session check failed; continuing logged out");
                InitState::Failed(e.to_string())
            }
        }
    }

    /// Re-read the session from the identity provider.
    ///
    /// Returns whether a session exists afterwards.
    pub async fn resync(&self) -> Result<bool> {
        if !self.idp.is_logged_in() {
            self.end_session("provider has no session");
            return Ok(false);
        }

        let raw = match self.idp.get_token(self.config.provider.min_validity).await {
            Ok(raw) => raw,
            Err(e) => {
                self.end_session("token unavailable");
                return Err(e);
            }
        };
        let subject = TokenClaims::from_jwt(&raw)
            .and_then(|c| c.sub)
            .or_else(|| self.idp.username());
        let roles: BTreeSet<String> = self.idp.get_user_roles().into_iter().collect();

        info!(subject = ?subject, roles = roles.len(), "Session established");
        *self.session.write() = Session::authenticated(subject, roles, CachedToken::new(raw));
        Ok(true)
    }

    /// Result of the startup session check
    pub fn init_state(&self) -> &InitState {
        &self.init_state
    }

    /// Snapshot of the session
    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Last-known login state
    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_authenticated()
    }

    /// Roles of the session (empty when logged out)
    pub fn roles(&self) -> BTreeSet<String> {
        self.session.read().roles().clone()
    }

    /// Whether the session holds `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.session.read().roles().contains(role)
    }

    /// Username of the logged-in user
    pub fn username(&self) -> Option<String> {
        if self.is_authenticated() {
            self.idp.username()
        } else {
            None
        }
    }

    /// A token valid for at least `min_validity`.
    ///
    /// Served from cache when possible. Otherwise one caller asks the
    /// provider while concurrent callers wait and then reuse its result.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] without a session or when renewal was
    /// refused (the session ends); provider errors are passed through.
    pub async fn current_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }

        let _refresh = self.refresh_lock.lock().await;
        if let Some(token) = self.cached_token()? {
            debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }

        match self.idp.get_token(self.config.provider.min_validity).await {
            Ok(raw) => {
                let token = CachedToken::new(raw.clone());
                debug!(expires_in = ?token.time_until_expiry(), "Token renewed");
                let roles: BTreeSet<String> = self.idp.get_user_roles().into_iter().collect();
                let mut session = self.session.write();
                if !session.is_authenticated() {
                    return Err(Error::NotAuthenticated);
                }
                let subject = session.subject().map(str::to_string);
                *session = Session::authenticated(subject, roles, token);
                Ok(raw)
            }
            Err(e) => {
                if matches!(e, Error::NotAuthenticated) || self.cached_token_expired() {
                    self.end_session("token expired without refresh");
                } else {
                    warn!(error = %e, "Token renewal failed; keeping session");
                }
                Err(e)
            }
        }
    }

    fn cached_token(&self) -> Result<Option<String>> {
        let session = self.session.read();
        let token = session.token().ok_or(Error::NotAuthenticated)?;
        Ok(token
            .is_usable(self.config.provider.min_validity)
            .then(|| token.access_token.clone()))
    }

    fn cached_token_expired(&self) -> bool {
        self.session
            .read()
            .token()
            .is_some_and(|t| t.expires_at.is_some() && t.time_until_expiry().is_none())
    }

    /// Fresh `Authorization` / `Content-Type` headers for one call
    pub async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.current_token().await?;
        auth_header(&token)
    }

    /// Account profile of the logged-in user
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] without a session.
    pub async fn profile(&self) -> Result<UserProfile> {
        if !self.is_authenticated() {
            return Err(Error::NotAuthenticated);
        }
        self.idp.load_user_profile().await
    }

    /// Send the user to the provider's login, coming back to `return_path`
    pub async fn login(&self, return_path: &str) -> Result<Redirect> {
        let return_uri = self.config.app_url(return_path);

        if let Some(store) = &self.redirects {
            let provider = &self.config.provider;
            if let Err(e) = store.save(
                &provider.realm,
                &provider.client_id,
                &PendingLogin::new(return_path),
            ) {
                warn!(error = %e, "Failed to record pending login");
            }
        }

        info!(return_uri = %return_uri, "Redirecting to login");
        self.idp
            .login(&LoginOptions {
                redirect_uri: return_uri.clone(),
            })
            .await?;
        Ok(Redirect { return_uri })
    }

    /// Clear the session and log out at the provider, returning to the origin
    pub async fn logout(&self) -> Result<Redirect> {
        self.end_session("logout");
        let return_uri = self.config.app.origin.clone();
        self.idp.logout(&return_uri).await?;
        Ok(Redirect { return_uri })
    }

    /// Take the return path left by a login that redirected away
    pub fn take_pending_login(&self) -> Option<PendingLogin> {
        let store = self.redirects.as_ref()?;
        let provider = &self.config.provider;
        store.take(&provider.realm, &provider.client_id)
    }

    fn end_session(&self, reason: &str) {
        let mut session = self.session.write();
        if session.is_authenticated() {
            info!(reason = %reason, subject = ?session.subject(), "Session ended");
        }
        *session = Session::anonymous();
    }
}
