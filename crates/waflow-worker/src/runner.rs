// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Processing of a single delivery: idempotence check, bounded handler run,
//! audit record, and settlement.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use waflow_core::{
    Clock, Delivery, JobOutcome, JobRun, RetryDecision, RetryPolicy, StateStore, Task,
    WaflowError,
};

use crate::handlers::Handlers;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Handler succeeded and the delivery was acked.
    Succeeded,
    /// A success was already recorded for the key; acked without running.
    AlreadyDone,
    /// Transient failure; requeued after the given delay.
    Retried(Duration),
    /// Moved to dead-letter storage.
    DeadLettered,
    /// Shutdown interrupted the handler; returned to the queue untouched.
    Requeued,
}

impl Settlement {
    fn label(self) -> &'static str {
        match self {
            Settlement::Succeeded => "success",
            Settlement::AlreadyDone => "skipped",
            Settlement::Retried(_) => "retrying",
            Settlement::DeadLettered => "failure",
            Settlement::Requeued => "requeued",
        }
    }
}

/// Runs deliveries through the handlers and settles them.
pub struct TaskRunner {
    handlers: Handlers,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    handler_timeout: Duration,
    shutdown_grace: Duration,
}

impl TaskRunner {
    pub fn new(
        handlers: Handlers,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        handler_timeout: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            handlers,
            store,
            clock,
            policy,
            handler_timeout,
            shutdown_grace,
        }
    }

    /// Processes one delivery to settlement.
    ///
    /// Once `cancel` fires the handler gets `shutdown_grace` to finish before
    /// the delivery is requeued without counting an attempt.
    pub async fn process(
        &self,
        delivery: Delivery,
        cancel: &CancellationToken,
    ) -> Result<Settlement, WaflowError> {
        let task = delivery.task().clone();
        let kind = task.kind().to_string();

        let settlement = self.process_inner(delivery, &task, cancel).await?;
        metrics::counter!(
            "waflow_tasks_completed_total",
            "kind" => kind,
            "outcome" => settlement.label()
        )
        .increment(1);
        Ok(settlement)
    }

    async fn process_inner(
        &self,
        delivery: Delivery,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Settlement, WaflowError> {
        if self.store.has_success(&task.idempotency_key).await? {
            debug!(
                task_id = %task.id,
                key = %task.idempotency_key,
                "duplicate delivery, already succeeded"
            );
            delivery.ack().await?;
            return Ok(Settlement::AlreadyDone);
        }

        let started = Instant::now();
        let grace = self.shutdown_grace;
        let run = tokio::time::timeout(self.handler_timeout, self.handlers.handle(task));
        let result = tokio::select! {
            r = run => match r {
                Ok(result) => result,
                Err(_) => Err(WaflowError::Timeout { duration: self.handler_timeout }),
            },
            _ = async {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!(task_id = %task.id, "shutdown grace elapsed, requeueing in-flight task");
                delivery.nack(true).await?;
                return Ok(Settlement::Requeued);
            }
        };
        metrics::histogram!("waflow_handler_latency_seconds", "kind" => task.kind().to_string())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.record(JobRun::for_task(task, JobOutcome::Success, None, self.clock.now()))
                    .await;
                delivery.ack().await?;
                info!(
                    task_id = %task.id,
                    kind = %task.kind(),
                    execution = task.execution(),
                    "task succeeded"
                );
                Ok(Settlement::Succeeded)
            }
            Err(e) if e.is_transient() => {
                let decision = {
                    let mut rng = rand::thread_rng();
                    self.policy.decide(task, &mut rng)
                };
                match decision {
                    RetryDecision::Retry(delay) => {
                        self.record(JobRun::for_task(
                            task,
                            JobOutcome::Retrying,
                            Some(e.to_string()),
                            self.clock.now(),
                        ))
                        .await;
                        delivery.retry(delay).await?;
                        warn!(
                            task_id = %task.id,
                            kind = %task.kind(),
                            execution = task.execution(),
                            max_attempts = task.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "task failed, retrying"
                        );
                        Ok(Settlement::Retried(delay))
                    }
                    RetryDecision::DeadLetter => {
                        let reason = format!(
                            "attempts exhausted after {} executions: {e}",
                            task.execution()
                        );
                        self.dead_letter(delivery, task, reason).await
                    }
                }
            }
            Err(e) => self.dead_letter(delivery, task, e.to_string()).await,
        }
    }

    async fn dead_letter(
        &self,
        delivery: Delivery,
        task: &Task,
        reason: String,
    ) -> Result<Settlement, WaflowError> {
        if let Err(e) = self.handlers.on_dead_letter(task).await {
            error!(task_id = %task.id, error = %e, "dead-letter hook failed");
        }
        self.record(JobRun::for_task(
            task,
            JobOutcome::Failure,
            Some(reason.clone()),
            self.clock.now(),
        ))
        .await;
        delivery.dead_letter(&reason).await?;
        Ok(Settlement::DeadLettered)
    }

    /// Appends to the audit trail. A failed write is logged, not fatal.
    async fn record(&self, run: JobRun) {
        match self.store.record_job_run(&run).await {
            Ok(()) => {}
            Err(WaflowError::DuplicateSubmission { key }) => {
                debug!(key = key.as_str(), "success already recorded by another delivery");
            }
            Err(e) => {
                error!(task_id = %run.task_id, outcome = %run.outcome, error = %e, "failed to record job run");
            }
        }
    }
}
