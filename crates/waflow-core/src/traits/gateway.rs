// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound messaging gateway adapter.

use async_trait::async_trait;

use crate::error::WaflowError;
use crate::traits::adapter::PluginAdapter;

/// Delivers text messages through the external messaging provider.
///
/// Implementations classify failures: server errors, rate limits, and timeouts
/// as [`WaflowError::TransientHandler`]; rejected requests (bad recipient,
/// invalid payload) as [`WaflowError::PermanentHandler`].
#[async_trait]
pub trait MessageGateway: PluginAdapter {
    /// Sends `body` to the MSISDN `to` and returns the provider's message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String, WaflowError>;
}
