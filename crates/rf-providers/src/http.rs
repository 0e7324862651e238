//! Shared reqwest plumbing for the provider adapters.

use std::time::Duration;

use rf_core::{Error, Result};

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level failure: timeouts keep their bound, everything else
/// becomes a status-less provider error.
pub(crate) fn send_error(provider: &str, timeout: Duration, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(provider, timeout)
    } else {
        Error::provider(provider, None, format!("request failed: {e}"))
    }
}

/// Pass through 2xx responses; turn anything else into a provider error
/// carrying the status code.
pub(crate) async fn check_status(
    provider: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let mut excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    if excerpt.len() < body.len() {
        excerpt.push_str("...");
    }
    tracing::warn!(provider, status = status.as_u16(), "provider returned error status");
    Err(Error::provider(provider, Some(status.as_u16()), excerpt))
}

/// Decode a JSON body; a body that does not match is retried.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(
    provider: &str,
    resp: reqwest::Response,
) -> Result<T> {
    resp.json::<T>()
        .await
        .map_err(|e| Error::provider(provider, None, format!("parse error: {e}")))
}
