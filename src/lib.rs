//! Storefront Auth Library
//!
//! Session and authorization mediation for the storefront client, sitting
//! between the application, an external identity provider, and the API.
//!
//! # Components
//!
//! - **[`CredentialProvider`](credentials::CredentialProvider)**: owns the
//!   session, caches and refreshes the bearer token
//! - **[`AuthorizationGate`](gate::AuthorizationGate)**: admits, sends to
//!   login, or sends to the unauthorized view
//! - **[`AuthenticatedClient`](request::AuthenticatedClient)**: attaches a
//!   fresh bearer credential to every outbound call
//! - **[`AuthContext`](context::AuthContext)**: startup wiring; the silent
//!   session check runs before any of the above can be used
//!
//! The identity provider and the HTTP transport are injected capabilities
//! ([`identity::IdentityProvider`], [`transport::HttpTransport`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod cli;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod headers;
pub mod identity;
pub mod request;
pub mod session;
pub mod storage;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing: {e}")))?,
    }

    Ok(())
}
