//! Shared HTTP plumbing for the REST providers.
//!
//! Every request goes through [`send`], which maps transport failures and
//! non-2xx statuses onto [`OcrError`] the same way for every provider:
//! 401/403 become [`OcrError::Auth`], other failures [`OcrError::Http`], and a
//! request that exceeds the client timeout [`OcrError::Timeout`].

use crate::error::OcrError;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 2000;

/// Build the client shared by one provider adapter.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, OcrError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ocr-extract/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OcrError::Internal(format!("HTTP client: {e}")))
}

/// Send `request` and return the response if its status is 2xx.
pub async fn send(
    provider: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, OcrError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, timeout, e))?;

    let status = response.status();
    debug!("{}: HTTP {}", provider, status);
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status.as_u16(), &body))
}

/// Send `request` and parse the 2xx body as JSON.
pub async fn send_json(
    provider: &str,
    timeout: Duration,
    request: reqwest::RequestBuilder,
) -> Result<Value, OcrError> {
    let response = send(provider, timeout, request).await?;
    read_json(provider, timeout, response).await
}

/// Parse a response body as JSON.
pub async fn read_json(
    provider: &str,
    timeout: Duration,
    response: reqwest::Response,
) -> Result<Value, OcrError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, timeout, e))?;
    serde_json::from_slice(&bytes).map_err(|e| OcrError::MalformedResponse {
        provider: provider.to_string(),
        detail: format!("body is not JSON: {e}"),
    })
}

/// Map a non-2xx status to the matching error.
pub fn status_error(provider: &str, status: u16, body: &str) -> OcrError {
    let body = truncate(body.trim());
    match status {
        401 | 403 => OcrError::Auth {
            provider: provider.to_string(),
            detail: format!("HTTP {status}: {body}"),
        },
        _ => OcrError::Http {
            provider: provider.to_string(),
            status,
            body,
        },
    }
}

fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> OcrError {
    if e.is_timeout() {
        OcrError::Timeout {
            provider: provider.to_string(),
            secs: timeout.as_secs(),
        }
    } else {
        OcrError::Transport {
            provider: provider.to_string(),
            detail: e.to_string(),
        }
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let cut = (0..=MAX_ERROR_BODY)
        .rev()
        .find(|&i| body.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}…", &body[..cut])
}

/// Required string field, or a [`OcrError::MalformedResponse`].
pub fn require_str<'a>(provider: &str, value: &'a Value, pointer: &str) -> Result<&'a str, OcrError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| OcrError::MalformedResponse {
            provider: provider.to_string(),
            detail: format!("missing string at '{pointer}'"),
        })
}
