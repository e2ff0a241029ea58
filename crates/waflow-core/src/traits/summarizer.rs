// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Summarization provider adapter.

use async_trait::async_trait;

use crate::error::WaflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::SummarizeInput;

/// Produces a summary of a conversation prefix.
#[async_trait]
pub trait Summarizer: PluginAdapter {
    async fn summarize(&self, input: &SummarizeInput) -> Result<String, WaflowError>;
}
