// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use waflow_config::WaflowConfig;
use waflow_core::{
    Backoff, Broker, Client, ClientId, Clock, ConversationId, IdempotencyKey,
    OutreachBatchPayload, PublishOutcome, SendMessagePayload, SummarizePayload, Task, TaskId,
    TaskPayload, WaflowError,
};

/// Result of a confirmed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The broker durably accepted a new task.
    Accepted(TaskId),
    /// Work with the same idempotency key was already submitted; nothing new was enqueued.
    Duplicate,
}

impl Submission {
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Submission::Accepted(id) => Some(id),
            Submission::Duplicate => None,
        }
    }
}

/// Publish timeout, publish retry budget, and the attempt budget stamped on new tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub publish_timeout: Duration,
    /// Extra publish attempts after the first one fails.
    pub publish_retries: u32,
    pub publish_backoff: Backoff,
    pub max_attempts: u32,
}

impl DispatchSettings {
    pub fn from_config(config: &WaflowConfig) -> Self {
        Self {
            publish_timeout: config.broker.publish_timeout(),
            publish_retries: config.broker.publish_retries,
            publish_backoff: Backoff::new(
                Duration::from_millis(config.broker.reconnect_base_ms),
                Duration::from_millis(config.broker.reconnect_cap_ms),
            )
            .with_jitter(config.retry.jitter_ratio),
            max_attempts: config.retry.max_attempts,
        }
    }
}

/// Converts units of work into durable broker entries.
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn Broker>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl TaskDispatcher {
    pub fn new(broker: Arc<dyn Broker>, clock: Arc<dyn Clock>, settings: DispatchSettings) -> Self {
        Self {
            broker,
            clock,
            settings,
        }
    }

    /// Submits `payload` under `key`, routed to the queue of its kind.
    ///
    /// Returns only after the broker confirmed the publish. Unavailability
    /// and publish timeouts are retried with backoff up to the configured
    /// budget before [`WaflowError::BrokerUnavailable`] reaches the caller.
    pub async fn submit(
        &self,
        payload: TaskPayload,
        key: IdempotencyKey,
    ) -> Result<Submission, WaflowError> {
        let task = Task::new(payload, key, self.settings.max_attempts, self.clock.now());
        let queue = task.kind().queue();
        let mut failures = 0u32;

        loop {
            let publish = self.broker.publish(queue, &task);
            let outcome = match tokio::time::timeout(self.settings.publish_timeout, publish).await {
                Ok(result) => result,
                Err(_) => Err(WaflowError::Timeout {
                    duration: self.settings.publish_timeout,
                }),
            };

            match outcome {
                Ok(PublishOutcome::Accepted) => {
                    metrics::counter!(
                        "waflow_tasks_submitted_total",
                        "queue" => queue.name(),
                        "outcome" => "accepted"
                    )
                    .increment(1);
                    debug!(
                        queue = queue.name(),
                        task_id = %task.id,
                        key = %task.idempotency_key,
                        "task submitted"
                    );
                    return Ok(Submission::Accepted(task.id));
                }
                Ok(PublishOutcome::Duplicate) => {
                    metrics::counter!(
                        "waflow_tasks_submitted_total",
                        "queue" => queue.name(),
                        "outcome" => "duplicate"
                    )
                    .increment(1);
                    info!(
                        queue = queue.name(),
                        key = %task.idempotency_key,
                        "duplicate submission ignored"
                    );
                    return Ok(Submission::Duplicate);
                }
                Err(e) if retryable(&e) && failures < self.settings.publish_retries => {
                    failures += 1;
                    let delay = {
                        let mut rng = rand::thread_rng();
                        self.settings.publish_backoff.delay(failures, &mut rng)
                    };
                    warn!(
                        queue = queue.name(),
                        key = %task.idempotency_key,
                        error = %e,
                        retry = failures,
                        delay_ms = delay.as_millis() as u64,
                        "publish not confirmed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::counter!(
                        "waflow_tasks_submitted_total",
                        "queue" => queue.name(),
                        "outcome" => "failed"
                    )
                    .increment(1);
                    warn!(
                        queue = queue.name(),
                        key = %task.idempotency_key,
                        error = %e,
                        "submission failed"
                    );
                    return Err(match e {
                        WaflowError::Timeout { duration } => WaflowError::BrokerUnavailable {
                            message: format!(
                                "publish to `{}` not confirmed within {duration:?}",
                                queue.name()
                            ),
                            source: None,
                        },
                        other => other,
                    });
                }
            }
        }
    }

    /// A scheduled outreach message for `client` in `cycle`.
    pub async fn submit_send_message(
        &self,
        client: &Client,
        body: &str,
        cycle: &str,
    ) -> Result<Submission, WaflowError> {
        let payload = TaskPayload::SendMessage(SendMessagePayload {
            client_id: client.id.clone(),
            to: client.contact.clone(),
            body: body.to_string(),
            conversation_id: None,
            cycle: Some(cycle.to_string()),
        });
        self.submit(payload, IdempotencyKey::send(&client.id, cycle))
            .await
    }

    /// An ad-hoc message outside any outreach cycle. Each call is new work.
    pub async fn submit_direct_message(
        &self,
        client: &Client,
        body: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<Submission, WaflowError> {
        let nonce = uuid::Uuid::new_v4().to_string();
        let payload = TaskPayload::SendMessage(SendMessagePayload {
            client_id: client.id.clone(),
            to: client.contact.clone(),
            body: body.to_string(),
            conversation_id,
            cycle: None,
        });
        self.submit(payload, IdempotencyKey::send_direct(&client.id, &nonce))
            .await
    }

    /// Summarization cycle `cycle` of `conversation`, triggered by `message_id`.
    ///
    /// Keyed by cycle, so every submit while the cycle waits for a worker maps
    /// to the same task.
    pub async fn submit_summarize(
        &self,
        conversation: &ConversationId,
        message_id: &str,
        cycle: i64,
    ) -> Result<Submission, WaflowError> {
        let payload = TaskPayload::Summarize(SummarizePayload {
            conversation_id: conversation.clone(),
            through_message_id: message_id.to_string(),
            cycle,
        });
        self.submit(payload, IdempotencyKey::summarize(conversation, cycle))
            .await
    }

    /// Outreach for `clients` in `cycle`.
    ///
    /// A single client is keyed by `(client, cycle)`; a larger batch by the
    /// cycle and its sorted client ids.
    pub async fn submit_outreach(
        &self,
        cycle: &str,
        clients: &[ClientId],
    ) -> Result<Submission, WaflowError> {
        let key = match clients {
            [only] => IdempotencyKey::outreach(only, cycle),
            many => IdempotencyKey::outreach_batch(cycle, many),
        };
        let payload = TaskPayload::OutreachBatch(OutreachBatchPayload {
            cycle: cycle.to_string(),
            client_ids: clients.to_vec(),
        });
        self.submit(payload, key).await
    }
}

fn retryable(e: &WaflowError) -> bool {
    matches!(
        e,
        WaflowError::BrokerUnavailable { .. } | WaflowError::Timeout { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_take_publish_and_retry_budgets_from_config() {
        let mut config = WaflowConfig::default();
        config.broker.publish_retries = 7;
        config.retry.max_attempts = 9;
        let settings = DispatchSettings::from_config(&config);
        assert_eq!(settings.publish_retries, 7);
        assert_eq!(settings.max_attempts, 9);
        assert_eq!(settings.publish_timeout, config.broker.publish_timeout());
    }

    #[test]
    fn only_unavailability_is_retried() {
        assert!(retryable(&WaflowError::broker_unavailable("down")));
        assert!(retryable(&WaflowError::Timeout {
            duration: Duration::from_secs(1)
        }));
        assert!(!retryable(&WaflowError::Publish {
            queue: "send_message".into(),
            message: "rejected".into()
        }));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn duplicate_submission_is_logged_not_raised() {
        let harness = waflow_test_utils::TestHarness::new().await.unwrap();
        let client = harness.add_client("+15550001", "Ana").await.unwrap();
        let dispatcher = TaskDispatcher::new(
            harness.broker_dyn(),
            harness.clock_dyn(),
            DispatchSettings::from_config(&harness.config),
        );

        dispatcher
            .submit_send_message(&client, "hi", "2026-06-01")
            .await
            .unwrap();
        let again = dispatcher
            .submit_send_message(&client, "hi", "2026-06-01")
            .await
            .unwrap();
        assert_eq!(again, Submission::Duplicate);
        assert!(logs_contain("duplicate submission ignored"));
        assert!(logs_contain("send:"));
    }
}
