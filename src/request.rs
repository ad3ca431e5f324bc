//! Authenticated request wrapper
//!
//! Every call resolves its own token right before sending, so a rotation is
//! picked up by the next call and never leaks into one already underway.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::credentials::CredentialProvider;
use crate::headers::{auth_header, json_header};
use crate::transport::{ApiResponse, HttpTransport};
use crate::{Error, Result};

/// Which outbound URLs get the bearer token.
///
/// Entries are absolute URLs; a relative entry such as `/api` is taken on
/// the API origin. A target matches an entry when it has the same origin
/// and its path sits under the entry's path, segment by segment.
#[derive(Debug, Clone, Default)]
pub struct BearerPolicy {
    prefixes: Vec<Url>,
    excluded: Vec<Url>,
}

impl BearerPolicy {
    /// Policy from prefix and exclusion lists, relative entries resolved
    /// against `base`
    #[must_use]
    pub fn new(prefixes: &[String], excluded: &[String], base: &Url) -> Self {
        Self {
            prefixes: resolve_entries(prefixes, base),
            excluded: resolve_entries(excluded, base),
        }
    }

    /// Whether a call to the absolute URL `url` gets the token.
    ///
    /// Exclusions win over prefixes. Anything that does not parse as an
    /// absolute URL never matches.
    #[must_use]
    pub fn applies_to(&self, url: &str) -> bool {
        let Ok(target) = Url::parse(url) else {
            return false;
        };
        if self.excluded.iter().any(|e| url_under(e, &target)) {
            return false;
        }
        self.prefixes.iter().any(|p| url_under(p, &target))
    }
}

fn resolve_entries(entries: &[String], base: &Url) -> Vec<Url> {
    entries
        .iter()
        .filter_map(|entry| {
            let resolved = if entry.starts_with('/') && !entry.starts_with("//") {
                base.join(entry)
            } else {
                Url::parse(entry)
            };
            resolved
                .map_err(|e| warn!(entry = %entry, error = %e, "Ignoring bearer URL entry"))
                .ok()
        })
        .collect()
}

fn url_under(entry: &Url, target: &Url) -> bool {
    if entry.origin() != target.origin() {
        return false;
    }
    let prefix = entry.path().trim_end_matches('/');
    target
        .path()
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Client that attaches a fresh bearer credential to outbound calls
pub struct AuthenticatedClient {
    credentials: Arc<CredentialProvider>,
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
    policy: BearerPolicy,
}

impl AuthenticatedClient {
    /// Create a client for the configured API
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when `api.base_url` is not an absolute URL.
    pub fn new(
        credentials: Arc<CredentialProvider>,
        transport: Arc<dyn HttpTransport>,
        api: &ApiConfig,
    ) -> Result<Self> {
        // Without the trailing slash, joining "orders" would replace the
        // last path segment instead of appending to it.
        let mut base = api.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("api.base_url: {e} ({})", api.base_url)))?;

        let policy = BearerPolicy::new(
            &api.bearer_url_prefixes,
            &api.bearer_excluded_urls,
            &base_url,
        );

        Ok(Self {
            credentials,
            transport,
            base_url,
            policy,
        })
    }

    /// Bearer policy used by [`dispatch`](Self::dispatch)
    pub fn policy(&self) -> &BearerPolicy {
        &self.policy
    }

    /// Absolute URL for `url`, resolved against the API base URL.
    ///
    /// `orders` lands under the base path, `/orders` under its origin,
    /// absolute URLs stay as they are.
    #[must_use]
    pub fn resolve(&self, url: &str) -> String {
        self.base_url
            .join(url)
            .map_or_else(|_| url.to_string(), String::from)
    }

    /// Send `method url` with a freshly resolved token.
    ///
    /// Transport results, error statuses included, come back untouched.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthenticated`] without a session (nothing is sent),
    /// otherwise whatever the transport reports.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        let token = self.credentials.current_token().await?;
        let headers = auth_header(&token)?;
        let target = self.resolve(url);

        debug!(method = %method, url = %target, "Authenticated request");
        self.transport.send(method, &target, headers, body).await
    }

    /// Send `method url`, attaching the token only where the bearer policy
    /// says so for the resolved URL.
    pub async fn dispatch(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        let target = self.resolve(url);
        if self.policy.applies_to(&target) {
            return self.request(method, url, body).await;
        }

        debug!(method = %method, url = %target, "Request without bearer");
        self.transport.send(method, &target, json_header(), body).await
    }

    /// GET
    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.request(Method::GET, url, None).await
    }

    /// POST with a JSON body
    pub async fn post(&self, url: &str, body: Value) -> Result<ApiResponse> {
        self.request(Method::POST, url, Some(body)).await
    }

    /// PUT with a JSON body
    pub async fn put(&self, url: &str, body: Value) -> Result<ApiResponse> {
        self.request(Method::PUT, url, Some(body)).await
    }

    /// DELETE
    pub async fn delete(&self, url: &str) -> Result<ApiResponse> {
        self.request(Method::DELETE, url, None).await
    }

    /// GET and decode a 2xx JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get(url).await?.error_for_status()?.json()
    }

    /// POST `body` and decode a 2xx JSON body
    pub async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.post(url, body).await?.error_for_status()?.json()
    }

    /// PUT `body` and decode a 2xx JSON body
    pub async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.put(url, body).await?.error_for_status()?.json()
    }

    /// DELETE and decode a 2xx JSON body
    pub async fn delete_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.delete(url).await?.error_for_status()?.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BearerPolicy {
        let base = Url::parse("http://localhost:8888/api/").unwrap();
        BearerPolicy::new(
            &["/api".to_string(), "https://api.example.com/v1".to_string()],
            &["/assets".to_string(), "/api/public".to_string()],
            &base,
        )
    }

    #[test]
    fn relative_and_absolute_prefixes_match() {
        let policy = policy();
        assert!(policy.applies_to("http://localhost:8888/api"));
        assert!(policy.applies_to("http://localhost:8888/api/orders?page=2"));
        assert!(policy.applies_to("https://api.example.com/v1/products"));
        assert!(!policy.applies_to("https://cdn.example.com/img.png"));
    }

    #[test]
    fn exclusions_win_over_prefixes() {
        let policy = policy();
        assert!(!policy.applies_to("http://localhost:8888/api/public/catalog"));
        assert!(policy.applies_to("http://localhost:8888/api/publications"));
    }

    #[test]
    fn relative_entry_is_bound_to_api_origin() {
        let policy = policy();
        assert!(!policy.applies_to("https://evil.example.com/api/steal"));
        assert!(!policy.applies_to("http://localhost:9999/api/orders"));
        assert!(!policy.applies_to("https://localhost:8888/api/orders"));
    }

    #[test]
    fn prefix_match_is_segment_aware() {
        let policy = policy();
        assert!(!policy.applies_to("http://localhost:8888/apiary/x"));
        assert!(!policy.applies_to("https://api.example.com/v10/products"));
    }

    #[test]
    fn relative_targets_never_match() {
        assert!(!policy().applies_to("/api/orders"));
    }

    #[test]
    fn default_port_is_the_same_origin() {
        let base = Url::parse("https://shop.example.com/api/").unwrap();
        let policy = BearerPolicy::new(&["https://shop.example.com:443/api".to_string()], &[], &base);
        assert!(policy.applies_to("https://shop.example.com/api/cart"));
    }

    #[test]
    fn unparsable_entries_are_ignored() {
        let base = Url::parse("http://localhost:8888/api/").unwrap();
        let policy = BearerPolicy::new(&["not a url".to_string(), "/api".to_string()], &[], &base);
        assert!(policy.applies_to("http://localhost:8888/api/orders"));
    }

    #[test]
    fn empty_policy_never_applies() {
        assert!(!BearerPolicy::default().applies_to("http://localhost:8888/api/orders"));
    }
}
