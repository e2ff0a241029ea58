// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock summarization provider for deterministic testing.
//!
//! `MockSummarizer` implements `Summarizer` with pre-configured replies,
//! enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use waflow_core::{
    AdapterType, HealthStatus, PluginAdapter, SummarizeInput, Summarizer, WaflowError,
};

use crate::ScriptedFailure;

/// A mock summarizer that returns pre-configured replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty, a summary
/// naming the message count is returned.
pub struct MockSummarizer {
    replies: Arc<Mutex<VecDeque<Result<String, ScriptedFailure>>>>,
    inputs: Arc<Mutex<Vec<SummarizeInput>>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock summarizer pre-loaded with the given replies.
    pub fn with_replies(replies: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Ok).collect())),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn add_reply(&self, text: impl Into<String>) {
        self.replies.lock().await.push_back(Ok(text.into()));
    }

    pub async fn fail_next(&self, failure: ScriptedFailure) {
        self.replies.lock().await.push_back(Err(failure));
    }

    /// Every input the summarizer was called with.
    pub async fn inputs(&self) -> Vec<SummarizeInput> {
        self.inputs.lock().await.clone()
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockSummarizer {
    fn name(&self) -> &str {
        "mock-summarizer"
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
impl Summarizer for MockSummarizer {
    async fn summarize(&self, input: &SummarizeInput) -> Result<String, WaflowError> {
        self.inputs.lock().await.push(input.clone());
        match self.replies.lock().await.pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(failure)) => Err(failure.into_error()),
            None => Ok(format!("summary of {} messages", input.messages.len())),
        }
    }
}
