//! Error types for storefront-auth

use std::io;

use thiserror::Error;

/// Result type alias for storefront-auth
pub type Result<T> = std::result::Result<T, Error>;

/// Session and authorization errors
#[derive(Error, Debug)]
pub enum Error {
    /// An operation that needs a session was invoked without one
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Identity provider unreachable or failed to initialize
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Failure reported by the HTTP transport, passed through untouched
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
