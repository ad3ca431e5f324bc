//! Outbound request headers

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::{Error, Result};

/// `Authorization: Bearer <token>` plus `Content-Type: application/json`,
/// built new for every call.
pub fn auth_header(token: &str) -> Result<HeaderMap> {
    let mut headers = json_header();
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Internal(format!("Token is not a valid header value: {e}")))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// `Content-Type: application/json` only
#[must_use]
pub fn json_header() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
