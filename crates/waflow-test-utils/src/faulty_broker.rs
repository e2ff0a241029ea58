// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker wrapper that injects connection failures.
//!
//! `FaultyBroker` delegates to a real broker and fails a configured number of
//! publishes or fetches first. Settlement, replay and stats always pass through.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use waflow_core::{
    AdapterType, Broker, DeadLetter, HealthStatus, Lease, PluginAdapter, PublishOutcome, Queue,
    QueueStats, Task, TaskId, WaflowError,
};

const ALWAYS: u32 = u32::MAX;

/// A broker that fails the first N publishes or fetches.
pub struct FaultyBroker {
    inner: Arc<dyn Broker>,
    publish_failures: AtomicU32,
    fetch_failures: AtomicU32,
    stall: Option<Duration>,
    publishes: AtomicU32,
    fetches: AtomicU32,
}

impl FaultyBroker {
    /// Passes everything through until told otherwise.
    pub fn new(inner: Arc<dyn Broker>) -> Self {
        Self {
            inner,
            publish_failures: AtomicU32::new(0),
            fetch_failures: AtomicU32::new(0),
            stall: None,
            publishes: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        }
    }

    /// Refuses every publish and reports itself unhealthy.
    pub fn down(inner: Arc<dyn Broker>) -> Self {
        Self::new(inner).failing_publishes(ALWAYS)
    }

    /// The next `n` publishes fail with `BrokerUnavailable`.
    pub fn failing_publishes(self, n: u32) -> Self {
        self.publish_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` fetches fail with `BrokerUnavailable`.
    pub fn failing_fetches(self, n: u32) -> Self {
        self.fetch_failures.store(n, Ordering::SeqCst);
        self
    }

    /// A failing publish hangs for `delay` before it reports the failure.
    pub fn stalling(mut self, delay: Duration) -> Self {
        self.stall = Some(delay);
        self
    }

    /// Publish attempts seen so far, failed ones included.
    pub fn publishes(&self) -> u32 {
        self.publishes.load(Ordering::SeqCst)
    }

    /// Fetch attempts seen so far, failed ones included.
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

/// Consumes one scripted failure, if any are left.
fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            ALWAYS => Some(ALWAYS),
            n => Some(n - 1),
        })
        .is_ok()
}

#[async_trait]
impl PluginAdapter for FaultyBroker {
    fn name(&self) -> &str {
        "faulty"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broker
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        if self.publish_failures.load(Ordering::SeqCst) == ALWAYS {
            return Ok(HealthStatus::Unhealthy("publishes refused".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        Ok(())
    }
}

#[async_trait]
impl Broker for FaultyBroker {
    async fn publish(&self, queue: Queue, task: &Task) -> Result<PublishOutcome, WaflowError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.publish_failures) {
            if let Some(delay) = self.stall {
                tokio::time::sleep(delay).await;
            }
            return Err(WaflowError::broker_unavailable("connection refused"));
        }
        self.inner.publish(queue, task).await
    }

    async fn fetch(&self, queue: Queue, lease: Duration) -> Result<Option<Lease>, WaflowError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fetch_failures) {
            return Err(WaflowError::broker_unavailable("connection reset"));
        }
        self.inner.fetch(queue, lease).await
    }

    async fn ack(&self, lease: &Lease) -> Result<(), WaflowError> {
        self.inner.ack(lease).await
    }

    async fn requeue(&self, lease: &Lease) -> Result<(), WaflowError> {
        self.inner.requeue(lease).await
    }

    async fn retry(&self, lease: &Lease, delay: Duration) -> Result<(), WaflowError> {
        self.inner.retry(lease, delay).await
    }

    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), WaflowError> {
        self.inner.dead_letter(lease, reason).await
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, WaflowError> {
        self.inner.dead_letters(limit).await
    }

    async fn replay(&self, task_id: &TaskId) -> Result<Task, WaflowError> {
        self.inner.replay(task_id).await
    }

    async fn stats(&self) -> Result<Vec<QueueStats>, WaflowError> {
        self.inner.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_run_out() {
        let remaining = AtomicU32::new(2);
        assert!(take_failure(&remaining));
        assert!(take_failure(&remaining));
        assert!(!take_failure(&remaining));
    }

    #[test]
    fn always_never_runs_out() {
        let remaining = AtomicU32::new(ALWAYS);
        for _ in 0..10 {
            assert!(take_failure(&remaining));
        }
        assert_eq!(remaining.load(Ordering::SeqCst), ALWAYS);
    }
}
