//! Configuration management
//!
//! Static, per-deployment settings: where the identity provider lives, which
//! outbound URLs get a bearer token, and which navigation paths need which
//! roles. Loaded from YAML plus `STOREFRONT_AUTH_` environment variables.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before `${VAR}` expansion.
    /// Paths support ~ expansion; later files override earlier ones.
    pub env_files: Vec<String>,
    /// Identity provider settings
    pub provider: ProviderConfig,
    /// Outbound API settings
    pub api: ApiConfig,
    /// Application (navigation) settings
    pub app: AppConfig,
}

/// Identity provider (realm) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the identity provider
    pub url: String,
    /// Realm / tenant
    pub realm: String,
    /// Public client id of this application
    pub client_id: String,
    /// Skip the silent session check at startup (session starts anonymous)
    pub skip_session_check: bool,
    /// Path of the page used for the silent check-sso iframe
    pub silent_check_sso_path: String,
    /// A cached token is refreshed once it has less than this left
    #[serde(with = "duration_serde")]
    pub min_validity: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            realm: "ecommerce".to_string(),
            client_id: "ecom-frontend".to_string(),
            skip_session_check: false,
            silent_check_sso_path: "/assets/silent-check-sso.html".to_string(),
            min_validity: Duration::from_secs(30),
        }
    }
}

/// Outbound API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL relative request paths are resolved against
    pub base_url: String,
    /// URLs starting with one of these get the bearer header
    pub bearer_url_prefixes: Vec<String>,
    /// URLs starting with one of these never get it (wins over prefixes)
    pub bearer_excluded_urls: Vec<String>,
    /// Per-request timeout of the HTTP transport
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888/api".to_string(),
            bearer_url_prefixes: vec![
                "/api".to_string(),
                "http://localhost:8888/api".to_string(),
            ],
            bearer_excluded_urls: vec!["/assets".to_string(), "/public".to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Application navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin of the application; login and logout redirects come back here
    pub origin: String,
    /// Where the navigation framework goes on `RedirectToUnauthorized`
    pub unauthorized_path: String,
    /// Paths admitted without a session
    pub public_paths: Vec<String>,
    /// Role requirements per navigation path prefix
    pub routes: Vec<RouteConfig>,
    /// Directory for the pending-login redirect state
    /// (default: `~/.storefront-auth/redirect`)
    pub redirect_store_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:4200".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            public_paths: vec!["/".to_string(), "/unauthorized".to_string()],
            routes: Vec::new(),
            redirect_store_dir: None,
        }
    }
}

/// Role requirement for a navigation path prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path prefix, e.g. `/admin`
    pub path: String,
    /// Any one of these roles admits; empty means "any authenticated user"
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("STOREFRONT_AUTH_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Check that URLs parse and the realm is identifiable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("provider.url", &self.provider.url),
            ("api.base_url", &self.api.base_url),
            ("app.origin", &self.app.origin),
        ] {
            Url::parse(value).map_err(|e| Error::Config(format!("{field}: {e} ({value})")))?;
        }

        if self.provider.realm.trim().is_empty() {
            return Err(Error::Config("provider.realm must not be empty".to_string()));
        }
        if self.provider.client_id.trim().is_empty() {
            return Err(Error::Config(
                "provider.client_id must not be empty".to_string(),
            ));
        }
        if !self.app.unauthorized_path.starts_with('/') {
            return Err(Error::Config(format!(
                "app.unauthorized_path must start with '/': {}",
                self.app.unauthorized_path
            )));
        }
        if let Some(route) = self.app.routes.iter().find(|r| !r.path.starts_with('/')) {
            return Err(Error::Config(format!(
                "app.routes: path must start with '/': {}",
                route.path
            )));
        }

        Ok(())
    }

    /// Absolute redirect URI for a path inside the application
    #[must_use]
    pub fn app_url(&self, path: &str) -> String {
        let origin = self.app.origin.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{origin}{path}")
        } else {
            format!("{origin}/{path}")
        }
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                match dirs::home_dir() {
                    Some(home) => path_str.replacen('~', &home.display().to_string(), 1),
                    None => path_str.clone(),
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!(path = %expanded, "Env file not found (skipped)");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!(path = %expanded, "Loaded env file"),
                Err(e) => tracing::warn!(path = %expanded, error = %e, "Failed to load env file"),
            }
        }
    }

    /// Expand `${VAR}` and `${VAR:-default}` in URL-valued settings
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(format!("env pattern: {e}")))?;

        for value in [
            &mut self.provider.url,
            &mut self.api.base_url,
            &mut self.app.origin,
        ] {
            *value = expand_string(&re, value);
        }
        for value in self
            .api
            .bearer_url_prefixes
            .iter_mut()
            .chain(self.api.bearer_excluded_urls.iter_mut())
        {
            *value = expand_string(&re, value);
        }

        Ok(())
    }
}

fn expand_string(re: &Regex, value: &str) -> String {
    re.replace_all(value, |caps: &regex::Captures| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
    })
    .into_owned()
}

/// Human-readable `Duration` fields ("30s", "5m", "250ms")
pub mod duration_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize a Duration as whole seconds ("30s") or milliseconds ("250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize "30s", "5m", "100ms" or a bare number of seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string is not a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        let parsed = if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        };

        parsed.map_err(serde::de::Error::custom)
    }
}
