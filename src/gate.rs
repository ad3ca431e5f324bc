//! Route admission
//!
//! [`AuthorizationGate::decide`] is called by the navigation framework before
//! a protected view renders. Logged-out users are sent through the identity
//! provider's login; logged-in users without a required role are sent to the
//! unauthorized view.
//!
//! Role requirements are ANY-of: holding one of the listed roles admits.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{AppConfig, RouteConfig};
use crate::credentials::{CredentialProvider, InitState};

/// Role required by [`AuthorizationGate::decide_admin`]
pub const ADMIN_ROLE: &str = "ADMIN";

/// What a navigation attempt needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirement {
    /// Any one of these admits; empty means "logged in is enough"
    pub required_roles: Vec<String>,
    /// Path being navigated to
    pub target_path: String,
}

impl RouteRequirement {
    /// Requirement satisfied by any logged-in user
    pub fn authenticated(target_path: impl Into<String>) -> Self {
        Self {
            required_roles: Vec::new(),
            target_path: target_path.into(),
        }
    }

    /// Requirement satisfied by holding any of `roles`
    pub fn with_roles<I, S>(target_path: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_roles: roles.into_iter().map(Into::into).collect(),
            target_path: target_path.into(),
        }
    }
}

/// Admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Render the view
    Allow,
    /// The login redirect has been started; come back to `return_path`
    RedirectToLogin {
        /// Path the user was heading to
        return_path: String,
    },
    /// Logged in but missing every required role
    RedirectToUnauthorized,
}

impl AuthDecision {
    /// Whether the view may render
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// In-app path the navigation framework should go to instead, if any.
    ///
    /// `RedirectToLogin` has none: the provider redirect already owns the
    /// browser.
    #[must_use]
    pub fn navigation_target<'a>(&self, unauthorized_path: &'a str) -> Option<&'a str> {
        match self {
            Self::RedirectToUnauthorized => Some(unauthorized_path),
            Self::Allow | Self::RedirectToLogin { .. } => None,
        }
    }
}

/// Role requirements by navigation path
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    public_paths: Vec<String>,
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    /// Build from app config; longer prefixes take precedence
    #[must_use]
    pub fn from_config(app: &AppConfig) -> Self {
        let mut routes = app.routes.clone();
        routes.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Self {
            public_paths: app.public_paths.clone(),
            routes,
        }
    }

    /// Requirement for navigating to `target_path`, `None` when public
    #[must_use]
    pub fn requirement_for(&self, target_path: &str) -> Option<RouteRequirement> {
        let path = strip_query(target_path);

        if self.public_paths.iter().any(|p| path_matches(p, path)) {
            return None;
        }

        let roles = self
            .routes
            .iter()
            .find(|r| path_matches(&r.path, path))
            .map(|r| r.roles.clone())
            .unwrap_or_default();

        Some(RouteRequirement {
            required_roles: roles,
            target_path: target_path.to_string(),
        })
    }
}

fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

/// Segment-aware prefix match; `/` only matches the root itself
fn path_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path == "/" || path.is_empty();
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Decides admission for navigation attempts
pub struct AuthorizationGate {
    credentials: Arc<CredentialProvider>,
    routes: RouteTable,
    unauthorized_path: String,
}

impl AuthorizationGate {
    /// Create a gate over the shared credential provider
    pub fn new(credentials: Arc<CredentialProvider>, app: &AppConfig) -> Self {
        Self {
            credentials,
            routes: RouteTable::from_config(app),
            unauthorized_path: app.unauthorized_path.clone(),
        }
    }

    /// Path of the unauthorized view
    pub fn unauthorized_path(&self) -> &str {
        &self.unauthorized_path
    }

    /// Route table used by [`decide_path`](Self::decide_path)
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether `req` may proceed.
    ///
    /// Never allows a logged-out session, including one that is logged out
    /// because the provider could not be reached.
    pub async fn decide(&self, req: &RouteRequirement) -> AuthDecision {
        if !self.credentials.is_authenticated() {
            if let InitState::Failed(reason) = self.credentials.init_state() {
                warn!(path = %req.target_path, reason = %reason, "Provider check failed earlier; sending to login");
            }
            if let Err(e) = self.credentials.login(&req.target_path).await {
                warn!(path = %req.target_path, error = %e, "Login redirect failed");
            }
            return AuthDecision::RedirectToLogin {
                return_path: req.target_path.clone(),
            };
        }

        if !req.required_roles.is_empty()
            && !req.required_roles.iter().any(|r| self.credentials.has_role(r))
        {
            info!(path = %req.target_path, required = ?req.required_roles, "Missing required role");
            return AuthDecision::RedirectToUnauthorized;
        }

        debug!(path = %req.target_path, "Navigation allowed");
        AuthDecision::Allow
    }

    /// [`decide`](Self::decide) with the required roles replaced by `ADMIN`
    pub async fn decide_admin(&self, req: &RouteRequirement) -> AuthDecision {
        let admin = RouteRequirement::with_roles(req.target_path.clone(), [ADMIN_ROLE]);
        self.decide(&admin).await
    }

    /// Decide for a path using the configured route table
    pub async fn decide_path(&self, target_path: &str) -> AuthDecision {
        match self.routes.requirement_for(target_path) {
            Some(req) => self.decide(&req).await,
            None => {
                debug!(path = %target_path, "Public path");
                AuthDecision::Allow
            }
        }
    }
}
