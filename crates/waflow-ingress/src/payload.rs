// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook payload parsing.
//!
//! Two shapes are accepted: the Cloud API form with messages nested under
//! `entry[].changes[].value.messages[]`, and the flat `messages[]` form. The
//! flat list is only read when the nested form yields nothing.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use waflow_core::{NormalizedMessage, WaflowError, normalize_msisdn};

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    wa_id: Option<String>,
    #[serde(default, rename = "type")]
    type_: Option<String>,
    /// Unix seconds, as a string or a number depending on the sender.
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    text: Option<TextPart>,
}

#[derive(Debug, Default, Deserialize)]
struct TextPart {
    #[serde(default)]
    body: Option<String>,
}

/// Result of parsing one webhook body.
#[derive(Debug, Default)]
pub struct ParsedWebhook {
    pub messages: Vec<NormalizedMessage>,
    /// Entries dropped because the sender could not be normalized.
    pub skipped: usize,
}

/// Extracts normalized messages from a decrypted webhook body.
///
/// Status callbacks and other payloads without messages parse to an empty
/// list. Anything that is not a JSON object of the expected shape is
/// [`WaflowError::MalformedPayload`].
pub fn parse_webhook(body: &[u8], received_at: DateTime<Utc>) -> Result<ParsedWebhook, WaflowError> {
    let payload: WebhookPayload = serde_json::from_slice(body)
        .map_err(|e| WaflowError::MalformedPayload(format!("invalid webhook JSON: {e}")))?;

    let nested: Vec<RawMessage> = payload
        .entry
        .into_iter()
        .flat_map(|e| e.changes)
        .flat_map(|c| c.value.messages)
        .collect();
    let raw = if nested.is_empty() {
        payload.messages
    } else {
        nested
    };

    let mut parsed = ParsedWebhook::default();
    for message in raw {
        match normalize(message, received_at) {
            Some(m) => parsed.messages.push(m),
            None => parsed.skipped += 1,
        }
    }
    Ok(parsed)
}

fn normalize(raw: RawMessage, received_at: DateTime<Utc>) -> Option<NormalizedMessage> {
    let from = raw.from.as_deref().or(raw.wa_id.as_deref()).unwrap_or_default();
    let Some(sender) = normalize_msisdn(from) else {
        warn!(from, "dropping webhook message without a usable sender");
        return None;
    };

    let raw_ts = raw.timestamp.as_ref().and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let timestamp = raw_ts
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(received_at);

    let msg_type = raw
        .type_
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "text".to_string());
    let body = if msg_type == "text" {
        raw.text.and_then(|t| t.body).unwrap_or_default()
    } else {
        String::new()
    };

    let message_id = raw.id.filter(|id| !id.is_empty()).unwrap_or_else(|| {
        let ts = raw_ts.unwrap_or_else(|| received_at.timestamp().to_string());
        format!("in_{sender}_{ts}")
    });

    Some(NormalizedMessage {
        message_id,
        sender,
        msg_type,
        body,
        timestamp,
    })
}
