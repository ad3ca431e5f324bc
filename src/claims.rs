//! Unverified JWT claim reading.
//!
//! The identity provider hands out opaque bearer tokens; when they happen to
//! be JWTs we read `exp` (to know how long the cached token stays usable) and
//! a few identity claims. Signatures are NOT checked here; the API that
//! receives the token does that.

use std::collections::{BTreeSet, HashMap};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

/// Claims of interest from an access token
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    #[serde(default)]
    pub sub: Option<String>,

    /// Expiry (Unix timestamp)
    #[serde(default)]
    pub exp: Option<u64>,

    /// Preferred username
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// Realm-level roles
    #[serde(default)]
    pub realm_access: Option<RoleClaim>,

    /// Client-level roles, keyed by client id
    #[serde(default)]
    pub resource_access: HashMap<String, RoleClaim>,
}

/// `{ "roles": [...] }` claim object
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleClaim {
    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TokenClaims {
    /// Read the payload segment of a compact JWT.
    ///
    /// Returns `None` for anything that is not a three-segment token with a
    /// base64url JSON payload.
    pub fn from_jwt(token: &str) -> Option<Self> {
        let mut segments = token.split('.');
        let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Realm roles plus the roles granted on `client_id`
    #[must_use]
    pub fn roles_for(&self, client_id: &str) -> BTreeSet<String> {
        let realm = self.realm_access.iter().flat_map(|r| r.roles.iter());
        let client = self
            .resource_access
            .get(client_id)
            .into_iter()
            .flat_map(|r| r.roles.iter());
        realm.chain(client).cloned().collect()
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
