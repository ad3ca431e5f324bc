//! Startup wiring
//!
//! [`AuthContext::start`] runs the silent session check and only then
//! builds the gate and the authenticated client. Both hold the same
//! credential provider, so there is one session per context.
//!
//! ```
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use storefront_auth::config::Config;
//! use storefront_auth::context::AuthContext;
//! use storefront_auth::identity::MemoryIdentityProvider;
//! use storefront_auth::transport::ReqwestTransport;
//!
//! let idp = Arc::new(MemoryIdentityProvider::signed_in("alice", ["USER"]));
//! let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(5))?);
//! let ctx = AuthContext::start_ephemeral(Config::default(), idp, transport).await?;
//!
//! assert!(ctx.gate().decide_path("/orders").await.is_allowed());
//! # Ok::<(), storefront_auth::Error>(())
//! # }).unwrap();
//! ```

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::credentials::{CredentialProvider, InitState};
use crate::gate::AuthorizationGate;
use crate::identity::IdentityProvider;
use crate::request::AuthenticatedClient;
use crate::storage::{PendingLogin, RedirectStore};
use crate::transport::HttpTransport;
use crate::Result;

/// Session, gate and client for one application instance
pub struct AuthContext {
    config: Arc<Config>,
    credentials: Arc<CredentialProvider>,
    gate: AuthorizationGate,
    client: AuthenticatedClient,
    resumed: Option<PendingLogin>,
}

impl AuthContext {
    /// Check the session, then assemble the gate and client.
    ///
    /// # Errors
    ///
    /// Fails when the redirect store directory cannot be created or the
    /// API base URL does not parse. An unreachable identity provider leaves
    /// the context logged out instead.
    pub async fn start(
        config: Config,
        idp: Arc<dyn IdentityProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let store = match &config.app.redirect_store_dir {
            Some(dir) => RedirectStore::new(dir.into())?,
            None => RedirectStore::default_location()?,
        };
        Self::assemble(config, idp, transport, Some(store)).await
    }

    /// Like [`start`](Self::start) without persisting pending logins
    pub async fn start_ephemeral(
        config: Config,
        idp: Arc<dyn IdentityProvider>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        Self::assemble(config, idp, transport, None).await
    }

    async fn assemble(
        config: Config,
        idp: Arc<dyn IdentityProvider>,
        transport: Arc<dyn HttpTransport>,
        store: Option<RedirectStore>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let credentials = CredentialProvider::bootstrap(idp, config.clone(), store).await;

        // A login redirect that came back is only meaningful with a session.
        let pending = credentials.take_pending_login();
        let resumed = pending.filter(|_| credentials.is_authenticated());

        let gate = AuthorizationGate::new(credentials.clone(), &config.app);
        let client = AuthenticatedClient::new(credentials.clone(), transport, &config.api)?;

        info!(
            realm = %config.provider.realm,
            authenticated = credentials.is_authenticated(),
            init = ?credentials.init_state(),
            "Auth context ready"
        );

        Ok(Self {
            config,
            credentials,
            gate,
            client,
            resumed,
        })
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared credential provider
    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Navigation gate
    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Authenticated API client
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// Outcome of the startup session check
    pub fn init_state(&self) -> &InitState {
        self.credentials.init_state()
    }

    /// Path to resume at after a completed login redirect, handed out once
    pub fn pending_return_path(&mut self) -> Option<String> {
        self.resumed.take().map(|p| p.return_path)
    }
}
