//! HTTP transport capability
//!
//! Outbound calls leave the crate through [`HttpTransport`]. Timeouts,
//! retries and connection handling belong to the implementation; the
//! authenticated client only adds headers and passes results through.

mod http;

pub use self::http::ReqwestTransport;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{Error, Result};

/// Transport for outbound API calls
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Send one request and return whatever came back
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Value>,
    ) -> Result<ApiResponse>;
}

/// Response as returned by the transport, any status
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl ApiResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as (lossy) UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Turn a non-2xx status into [`Error::Transport`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Transport(format!(
                "HTTP {} - {}",
                self.status,
                self.text()
            )))
        }
    }
}
