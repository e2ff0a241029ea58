// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock outbound messaging gateway for deterministic testing.
//!
//! `MockGateway` implements `MessageGateway`, capturing every delivered text
//! and replaying scripted failures in FIFO order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use waflow_core::{AdapterType, HealthStatus, MessageGateway, PluginAdapter, WaflowError};

use crate::ScriptedFailure;

/// A text the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub to: String,
    pub body: String,
    pub message_id: String,
}

/// A mock gateway that records sends.
///
/// Scripted failures are consumed one per call before anything is recorded,
/// so a failed call never shows up in [`MockGateway::sent`].
pub struct MockGateway {
    sent: Arc<Mutex<Vec<SentText>>>,
    failures: Arc<Mutex<VecDeque<ScriptedFailure>>>,
    delay: Option<Duration>,
    counter: AtomicU64,
    calls: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            delay: None,
            counter: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a failure for the next call.
    pub async fn fail_next(&self, failure: ScriptedFailure) {
        self.failures.lock().await.push_back(failure);
    }

    /// All texts accepted so far.
    pub async fn sent(&self) -> Vec<SentText> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of `send_text` calls, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
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
impl MessageGateway for MockGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<String, WaflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failures.lock().await.pop_front() {
            return Err(failure.into_error());
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let message_id = format!("wamid.mock-{n}");
        self.sent.lock().await.push(SentText {
            to: to.to_string(),
            body: body.to_string(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }
}
