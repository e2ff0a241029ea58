// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use waflow_core::WaflowError;

use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// API version sent as `anthropic-version`.
pub const API_VERSION: &str = "2023-06-01";

/// HTTP client for Anthropic API communication.
///
/// Makes one request per call. Failures come back classified: 429, 5xx, 529
/// and timeouts as transient, everything else as permanent.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    messages_url: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: &SecretString, base_url: &str, timeout: Duration) -> Result<Self, WaflowError> {
        let mut key = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| WaflowError::Config(format!("invalid API key header value: {e}")))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| WaflowError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            messages_url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, WaflowError> {
        let response = self
            .client
            .post(&self.messages_url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WaflowError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    WaflowError::TransientHandler {
                        message: format!("HTTP request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        debug!(status = %status, "completion response received");

        if status.is_success() {
            let body = response.text().await.map_err(|e| WaflowError::TransientHandler {
                message: format!("failed to read response body: {e}"),
                source: Some(Box::new(e)),
            })?;
            return serde_json::from_str(&body).map_err(|e| WaflowError::PermanentHandler {
                message: format!("failed to parse API response: {e}"),
                source: Some(Box::new(e)),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => format!(
                "Anthropic API error ({}): {}",
                api_err.error.type_, api_err.error.message
            ),
            Err(_) => format!("API returned {status}: {body}"),
        };
        if is_transient_error(status) {
            warn!(status = %status, "transient summarizer failure");
            Err(WaflowError::transient(message))
        } else {
            Err(WaflowError::permanent(message))
        }
    }
}

/// Rate limits, server errors, and the overload status.
fn is_transient_error(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() || status.as_u16() == 529
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for code in [429u16, 500, 502, 503, 529] {
            assert!(is_transient_error(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [400u16, 401, 403, 404, 413] {
            assert!(!is_transient_error(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }
}
