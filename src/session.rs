//! Session record
//!
//! The one piece of shared mutable state. Only [`CredentialProvider`]
//! writes it; everybody else reads snapshots.
//!
//! [`CredentialProvider`]: crate::credentials::CredentialProvider

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::claims::TokenClaims;

/// Bearer token with its (optional) expiry
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// Raw bearer value
    pub access_token: String,

    /// Expiry as Unix timestamp, if the token told us
    pub expires_at: Option<u64>,
}

// Keep the bearer value out of logs.
impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    /// Wrap a token, reading its expiry from the `exp` claim when it is a JWT
    #[must_use]
    pub fn new(access_token: String) -> Self {
        let expires_at = TokenClaims::from_jwt(&access_token).and_then(|c| c.exp);
        Self {
            access_token,
            expires_at,
        }
    }

    /// Whether the token may be handed out without asking the provider.
    ///
    /// Tokens without a known expiry are never usable from cache, and known
    /// ones stop being usable `min_validity` before they expire.
    #[must_use]
    pub fn is_usable(&self, min_validity: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now_secs() + min_validity.as_secs() < expires_at,
            None => false,
        }
    }

    /// Time until expiration
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        let now = now_secs();
        (expires_at > now).then(|| Duration::from_secs(expires_at - now))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Last-known session state.
///
/// Invariant: `token.is_some() == authenticated`, and `roles` is empty
/// while unauthenticated. The fields are private so the constructors are
/// the only way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    authenticated: bool,
    subject: Option<String>,
    roles: BTreeSet<String>,
    token: Option<CachedToken>,
}

impl Session {
    /// No session
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            authenticated: false,
            subject: None,
            roles: BTreeSet::new(),
            token: None,
        }
    }

    /// Authenticated session holding `token`
    #[must_use]
    pub fn authenticated(
        subject: Option<String>,
        roles: BTreeSet<String>,
        token: CachedToken,
    ) -> Self {
        Self {
            authenticated: true,
            subject,
            roles,
            token: Some(token),
        }
    }

    /// Whether a session exists
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Subject identifier, when known
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Role set (empty when unauthenticated)
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Current token, when authenticated
    #[must_use]
    pub fn token(&self) -> Option<&CachedToken> {
        self.token.as_ref()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}
