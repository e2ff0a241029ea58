// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the gateway's `/v1/messages` endpoint.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SendTextRequest<'a> {
    pub messaging_product: &'static str,
    /// Recipient MSISDN, digits only.
    pub to: &'a str,
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub text: TextBody<'a>,
}

impl<'a> SendTextRequest<'a> {
    pub fn new(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to,
            type_: "text",
            text: TextBody { body },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextBody<'a> {
    pub body: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendTextResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// Error body. The gateway uses either a Graph-style `error` object or a
/// `meta` block, depending on the endpoint version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub meta: Option<ErrorMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMeta {
    #[serde(default)]
    pub developer_message: Option<String>,
}

impl ErrorResponse {
    /// Best human-readable description the body offers.
    pub fn describe(&self) -> Option<String> {
        if let Some(ErrorDetail {
            message: Some(message),
            code,
        }) = &self.error
        {
            return Some(match code {
                Some(code) => format!("{message} (code {code})"),
                None => message.clone(),
            });
        }
        self.meta.as_ref().and_then(|m| m.developer_message.clone())
    }
}
