// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery stream over one or more queues.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waflow_config::model::BrokerConfig;
use waflow_core::{Backoff, Broker, Delivery, Queue};

/// Polling and reconnect parameters for a [`Consumer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerSettings {
    /// Sleep between fetch rounds when every queue is empty.
    pub poll_interval: Duration,
    /// Lease granted on each fetched task.
    pub lease: Duration,
    /// Backoff between fetch attempts after a failure.
    pub reconnect: Backoff,
}

impl ConsumerSettings {
    pub fn from_config(config: &BrokerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            lease: config.lease(),
            reconnect: Backoff::new(
                Duration::from_millis(config.reconnect_base_ms),
                Duration::from_millis(config.reconnect_cap_ms),
            )
            .with_jitter(0.1),
        }
    }
}

/// Pulls deliveries from a set of queues in round-robin order.
pub struct Consumer {
    broker: Arc<dyn Broker>,
    queues: Vec<Queue>,
    settings: ConsumerSettings,
    cancel: CancellationToken,
    cursor: usize,
    failures: u32,
}

impl Consumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        queues: Vec<Queue>,
        settings: ConsumerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            broker,
            queues,
            settings,
            cancel,
            cursor: 0,
            failures: 0,
        }
    }

    /// Waits for the next delivery.
    ///
    /// Returns `None` once the cancellation token fires, and never otherwise:
    /// empty queues are polled again after `poll_interval`, and fetch errors
    /// back off and retry.
    pub async fn next(&mut self) -> Option<Delivery> {
        if self.queues.is_empty() {
            self.cancel.cancelled().await;
            return None;
        }

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            match self.fetch_round().await {
                Ok(Some(delivery)) => return Some(delivery),
                Ok(None) => {
                    if !self.pause(self.settings.poll_interval).await {
                        return None;
                    }
                }
                Err(e) => {
                    self.failures = self.failures.saturating_add(1);
                    let delay = {
                        let mut rng = rand::thread_rng();
                        self.settings.reconnect.delay(self.failures, &mut rng)
                    };
                    metrics::counter!("waflow_broker_reconnects_total").increment(1);
                    warn!(
                        error = %e,
                        failures = self.failures,
                        delay_ms = delay.as_millis() as u64,
                        "broker fetch failed, reconnecting after backoff"
                    );
                    if !self.pause(delay).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Converts the consumer into a `Stream` of deliveries.
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send {
        futures::stream::unfold(self, |mut consumer| async move {
            consumer.next().await.map(|delivery| (delivery, consumer))
        })
    }

    /// Tries each queue once, starting after the last queue that yielded.
    async fn fetch_round(&mut self) -> Result<Option<Delivery>, waflow_core::WaflowError> {
        for offset in 0..self.queues.len() {
            let idx = (self.cursor + offset) % self.queues.len();
            let queue = self.queues[idx];
            if let Some(lease) = self.broker.fetch(queue, self.settings.lease).await? {
                if self.failures > 0 {
                    info!(failures = self.failures, "broker connection restored");
                    self.failures = 0;
                }
                self.cursor = (idx + 1) % self.queues.len();
                debug!(
                    queue = queue.name(),
                    task_id = %lease.task.id,
                    execution = lease.task.execution(),
                    "task delivered"
                );
                return Ok(Some(Delivery::new(lease, self.broker.clone())));
            }
        }
        if self.failures > 0 {
            info!(failures = self.failures, "broker connection restored");
            self.failures = 0;
        }
        Ok(None)
    }

    /// Sleeps for `delay` unless cancelled first. Returns false on cancel.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
