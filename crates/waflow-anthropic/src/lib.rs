// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic summarizer for Waflow.
//!
//! Implements [`Summarizer`] over the Anthropic Messages API. The conversation
//! prefix is rendered as a plain transcript, preceded by the previous summary
//! when there is one, and sent as a single user message.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info};
use waflow_config::model::SummarizerConfig;
use waflow_core::{
    AdapterType, Direction, HealthStatus, PluginAdapter, SummarizeInput, Summarizer, WaflowError,
};

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Summarizer backed by an Anthropic model.
pub struct AnthropicSummarizer {
    client: AnthropicClient,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl AnthropicSummarizer {
    /// Creates a summarizer from configuration.
    ///
    /// API key resolution order: `summarizer.api_key` -> `ANTHROPIC_API_KEY`
    /// environment variable -> error.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, WaflowError> {
        let api_key = resolve_api_key(
            config.api_key.as_deref(),
            std::env::var("ANTHROPIC_API_KEY").ok(),
        )?;
        let client = AnthropicClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(model = config.model.as_str(), "Anthropic summarizer initialized");
        Ok(Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }

    fn build_request(&self, input: &SummarizeInput) -> MessageRequest {
        MessageRequest {
            model: self.model.clone(),
            messages: vec![ApiMessage::user(render_transcript(input))],
            system: Some(self.system_prompt.clone()).filter(|s| !s.trim().is_empty()),
            max_tokens: self.max_tokens,
        }
    }
}

fn resolve_api_key(
    config_key: Option<&str>,
    env_key: Option<String>,
) -> Result<SecretString, WaflowError> {
    config_key
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or(env_key.filter(|k| !k.is_empty()))
        .map(SecretString::from)
        .ok_or_else(|| {
            WaflowError::Config(
                "Anthropic API key not found. Set summarizer.api_key in config or ANTHROPIC_API_KEY environment variable.".into(),
            )
        })
}

/// Renders the conversation as `[timestamp] Speaker: text` lines.
fn render_transcript(input: &SummarizeInput) -> String {
    let mut out = String::new();
    if let Some(previous) = input.previous_summary.as_deref().filter(|s| !s.is_empty()) {
        out.push_str("Summary of the conversation so far:\n");
        out.push_str(previous);
        out.push_str("\n\n");
    }
    out.push_str("Conversation:\n");
    for message in &input.messages {
        let speaker = match message.direction {
            Direction::Inbound => "Client",
            Direction::Outbound => "Business",
        };
        let text = if message.body.is_empty() {
            format!("[{}]", message.msg_type)
        } else {
            message.body.clone()
        };
        out.push_str(&format!(
            "[{}] {speaker}: {text}\n",
            message.sent_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

#[async_trait]
impl PluginAdapter for AnthropicSummarizer {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Summarizer
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        Ok(())
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize(&self, input: &SummarizeInput) -> Result<String, WaflowError> {
        let request = self.build_request(input);
        let response = self.client.complete_message(&request).await?;
        debug!(
            conversation_id = %input.conversation_id,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
            "summary generated"
        );

        let summary = response.text().trim().to_string();
        if summary.is_empty() {
            return Err(WaflowError::transient("model returned an empty summary"));
        }
        Ok(summary)
    }
}
