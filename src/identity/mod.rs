//! Identity provider capability
//!
//! The protocol side of the identity provider (token issuance, PKCE, silent
//! renewal) lives outside this crate. What the rest of the crate needs from
//! it is captured by [`IdentityProvider`]; adapters for a concrete client
//! implement the trait and are injected into
//! [`CredentialProvider`](crate::credentials::CredentialProvider).

mod memory;

pub use memory::MemoryIdentityProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::config::Config;

/// How the provider decides the initial session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnLoad {
    /// Non-interactive check of an existing session
    CheckSso,
    /// Force the interactive login on startup
    LoginRequired,
}

/// Options for [`IdentityProvider::init`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOptions {
    /// Identity provider base URL
    pub url: String,
    /// Realm / tenant
    pub realm: String,
    /// Client id
    pub client_id: String,
    /// Startup behavior
    pub on_load: OnLoad,
    /// Page loaded in the hidden iframe for the silent check
    pub silent_check_sso_redirect_uri: String,
    /// PKCE method
    pub pkce_method: String,
}

impl InitOptions {
    /// Silent-check options for the configured realm
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.provider.url.clone(),
            realm: config.provider.realm.clone(),
            client_id: config.provider.client_id.clone(),
            on_load: OnLoad::CheckSso,
            silent_check_sso_redirect_uri: config.app_url(&config.provider.silent_check_sso_path),
            pkce_method: "S256".to_string(),
        }
    }
}

/// Options for [`IdentityProvider::login`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOptions {
    /// Absolute URI to come back to after a successful login
    pub redirect_uri: String,
}

/// Account profile as served by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Account id
    #[serde(default)]
    pub id: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Given name
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Whether the email address has been verified
    #[serde(default)]
    pub email_verified: Option<bool>,
}

/// Identity-provider client as seen by this crate.
///
/// `login` and `logout` start a browser redirect. When they return `Ok`
/// the redirect has been issued; the flow that called them is over.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Initialize the client; `Ok(true)` when a session already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderUnavailable`](crate::Error::ProviderUnavailable)
    /// when the provider cannot be reached.
    async fn init(&self, options: &InitOptions) -> Result<bool>;

    /// Start the interactive login
    async fn login(&self, options: &LoginOptions) -> Result<()>;

    /// End the provider session and redirect to `redirect_uri`
    async fn logout(&self, redirect_uri: &str) -> Result<()>;

    /// Whether the provider currently holds a session
    fn is_logged_in(&self) -> bool;

    /// Current access token, renewed first if it expires within `min_validity`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`](crate::Error::NotAuthenticated)
    /// when there is no session or renewal was refused.
    async fn get_token(&self, min_validity: Duration) -> Result<String>;

    /// Roles granted to the current user
    fn get_user_roles(&self) -> Vec<String>;

    /// Whether the current user holds `role`
    fn is_user_in_role(&self, role: &str) -> bool {
        self.get_user_roles().iter().any(|r| r == role)
    }

    /// Fetch the account profile
    async fn load_user_profile(&self) -> Result<UserProfile>;

    /// Username of the current user
    fn username(&self) -> Option<String>;
}
