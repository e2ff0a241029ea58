// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the gateway's messages endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use waflow_config::model::WhatsAppConfig;
use waflow_core::{
    AdapterType, HealthStatus, MessageGateway, PluginAdapter, WaflowError, wire_msisdn,
};

use crate::types::{ErrorResponse, SendTextRequest, SendTextResponse};

/// Header carrying the gateway API key.
const API_KEY_HEADER: &str = "D360-API-KEY";

/// Outbound WhatsApp gateway.
///
/// Each call makes exactly one HTTP request; retries belong to the worker.
#[derive(Debug, Clone)]
pub struct WhatsAppGateway {
    client: reqwest::Client,
    api_key: SecretString,
    messages_url: String,
    timeout: Duration,
}

impl WhatsAppGateway {
    /// Builds a gateway client from configuration.
    ///
    /// Fails with [`WaflowError::Config`] if no API key is configured.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, WaflowError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| WaflowError::Config("whatsapp.api_key is not set".into()))?;
        Self::new(
            SecretString::from(api_key.to_string()),
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn new(api_key: SecretString, base_url: &str, timeout: Duration) -> Result<Self, WaflowError> {
        // Validate the key as a header value up front rather than on first send.
        HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| WaflowError::Config("whatsapp.api_key is not a valid header value".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| WaflowError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            messages_url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    fn key_header(&self) -> Result<HeaderValue, WaflowError> {
        let mut value = HeaderValue::from_str(self.api_key.expose_secret())
            .map_err(|_| WaflowError::Config("whatsapp.api_key is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

/// 429 and 5xx are worth retrying; every other failure status is final.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl PluginAdapter for WhatsAppGateway {
    fn name(&self) -> &str {
        "whatsapp-360dialog"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for WhatsAppGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, WaflowError> {
        let to_digits = wire_msisdn(to);
        if to_digits.is_empty() {
            return Err(WaflowError::permanent(format!("invalid recipient `{to}`")));
        }

        let response = self
            .client
            .post(&self.messages_url)
            .header(API_KEY_HEADER, self.key_header()?)
            .json(&SendTextRequest::new(&to_digits, body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WaflowError::Timeout {
                        duration: self.timeout,
                    }
                } else {
                    WaflowError::TransientHandler {
                        message: format!("gateway request failed: {e}"),
                        source: Some(Box::new(e)),
                    }
                }
            })?;

        let status = response.status();
        debug!(status = %status, "gateway response received");

        if status.is_success() {
            let parsed: SendTextResponse = response.json().await.map_err(|e| {
                // The message may already be out; retrying could send it twice.
                WaflowError::PermanentHandler {
                    message: format!("unreadable gateway response: {e}"),
                    source: Some(Box::new(e)),
                }
            })?;
            return parsed
                .messages
                .into_iter()
                .next()
                .map(|m| m.id)
                .ok_or_else(|| WaflowError::permanent("gateway response lacks a message id"));
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorResponse>(&text)
            .ok()
            .and_then(|e| e.describe())
            .unwrap_or(text);
        let message = format!("gateway returned {status}: {detail}");
        if is_transient_status(status) {
            warn!(status = %status, "transient gateway failure");
            Err(WaflowError::transient(message))
        } else {
            warn!(status = %status, "gateway rejected message");
            Err(WaflowError::permanent(message))
        }
    }
}
