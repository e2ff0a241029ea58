// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker contract: durable queues, at-least-once delivery, dead-lettering.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::WaflowError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeadLetter, PublishOutcome, Queue, QueueStats, Task, TaskId};

/// A task checked out of a queue under a time-bounded lease.
///
/// While the lease is valid no other consumer receives the task. Once it
/// expires the broker may redeliver it, and settlements carrying the old
/// token fail with [`WaflowError::LeaseLost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub task: Task,
    pub token: String,
}

/// Durable, at-least-once task broker.
///
/// Implementations must commit a publish before returning (publisher confirm)
/// and must never deliver the same task to two consumers under live leases.
#[async_trait]
pub trait Broker: PluginAdapter {
    /// Durably enqueues `task` on `queue`.
    ///
    /// Returns [`PublishOutcome::Duplicate`] without side effects if a task
    /// with the same idempotency key already exists in any state.
    async fn publish(&self, queue: Queue, task: &Task) -> Result<PublishOutcome, WaflowError>;

    /// Claims the oldest ready task on `queue` for `lease`, if any.
    async fn fetch(&self, queue: Queue, lease: Duration) -> Result<Option<Lease>, WaflowError>;

    /// Marks the leased task as succeeded.
    async fn ack(&self, lease: &Lease) -> Result<(), WaflowError>;

    /// Returns the leased task to its queue immediately, leaving attempts untouched.
    async fn requeue(&self, lease: &Lease) -> Result<(), WaflowError>;

    /// Records a failed execution and makes the task eligible again after `delay`.
    async fn retry(&self, lease: &Lease, delay: Duration) -> Result<(), WaflowError>;

    /// Moves the leased task to dead-letter storage.
    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), WaflowError>;

    /// Lists dead letters, newest first.
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, WaflowError>;

    /// Puts a dead-lettered task back into circulation with a fresh attempt budget.
    async fn replay(&self, task_id: &TaskId) -> Result<Task, WaflowError>;

    /// Entry counts per queue.
    async fn stats(&self) -> Result<Vec<QueueStats>, WaflowError>;
}

/// A task handed to a consumer, together with the means to settle it.
///
/// Every settlement consumes the delivery, so a delivery is settled at most once.
pub struct Delivery {
    lease: Lease,
    broker: Arc<dyn Broker>,
}

impl Delivery {
    pub fn new(lease: Lease, broker: Arc<dyn Broker>) -> Self {
        Self { lease, broker }
    }

    /// The delivered task.
    pub fn task(&self) -> &Task {
        &self.lease.task
    }

    /// The underlying lease.
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Confirms successful processing.
    pub async fn ack(self) -> Result<(), WaflowError> {
        self.broker.ack(&self.lease).await
    }

    /// Rejects the delivery. With `requeue` the task goes back to its queue
    /// unchanged; without it the task is dead-lettered.
    pub async fn nack(self, requeue: bool) -> Result<(), WaflowError> {
        if requeue {
            self.broker.requeue(&self.lease).await
        } else {
            self.broker
                .dead_letter(&self.lease, "rejected by consumer")
                .await
        }
    }

    /// Schedules another execution after `delay`.
    pub async fn retry(self, delay: Duration) -> Result<(), WaflowError> {
        self.broker.retry(&self.lease, delay).await
    }

    /// Moves the task to dead-letter storage with `reason`.
    pub async fn dead_letter(self, reason: &str) -> Result<(), WaflowError> {
        self.broker.dead_letter(&self.lease, reason).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("task_id", &self.lease.task.id)
            .field("kind", &self.lease.task.kind())
            .field("attempts", &self.lease.task.attempts)
            .finish()
    }
}
