// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`Broker`] trait.
//!
//! Each queue is a slice of the `tasks` table. A publish returns only after
//! its transaction commits, and deliveries are leases that expire and get
//! redelivered if the consumer disappears.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use waflow_core::{
    AdapterType, Broker, Clock, DeadLetter, HealthStatus, Lease, PluginAdapter, PublishOutcome,
    Queue, QueueStats, Task, TaskId, WaflowError,
};

use crate::database::Database;
use crate::queries::tasks;

/// Durable broker backed by the shared SQLite database.
pub struct SqliteBroker {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteBroker {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    fn after(&self, delay: Duration) -> Result<chrono::DateTime<chrono::Utc>, WaflowError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| WaflowError::Internal(format!("delay out of range: {e}")))?;
        Ok(self.clock.now() + delay)
    }
}

#[async_trait]
impl PluginAdapter for SqliteBroker {
    fn name(&self) -> &str {
        "sqlite-broker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Broker
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        match self.db.ping().await {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        self.db.checkpoint().await?;
        debug!("broker shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl Broker for SqliteBroker {
    async fn publish(&self, queue: Queue, task: &Task) -> Result<PublishOutcome, WaflowError> {
        // A write failure here means the confirm never arrived.
        let outcome = tasks::publish(&self.db, queue, task, self.clock.now())
            .await
            .map_err(|e| WaflowError::BrokerUnavailable {
                message: format!("publish to `{}` not confirmed", queue.name()),
                source: Some(Box::new(e)),
            })?;
        debug!(
            queue = queue.name(),
            task_id = %task.id,
            key = %task.idempotency_key,
            ?outcome,
            "publish confirmed"
        );
        Ok(outcome)
    }

    async fn fetch(&self, queue: Queue, lease: Duration) -> Result<Option<Lease>, WaflowError> {
        let token = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let locked_until = self.after(lease)?;
        let task = tasks::claim(&self.db, queue, &token, now, locked_until)
            .await
            .map_err(|e| WaflowError::BrokerUnavailable {
                message: format!("fetch from `{}` failed", queue.name()),
                source: Some(Box::new(e)),
            })?;
        Ok(task.map(|task| Lease { task, token }))
    }

    async fn ack(&self, lease: &Lease) -> Result<(), WaflowError> {
        tasks::ack(&self.db, &lease.task.id, &lease.token, self.clock.now()).await
    }

    async fn requeue(&self, lease: &Lease) -> Result<(), WaflowError> {
        let now = self.clock.now();
        tasks::release(&self.db, &lease.task.id, &lease.token, now, false, now).await
    }

    async fn retry(&self, lease: &Lease, delay: Duration) -> Result<(), WaflowError> {
        let next_run_at = self.after(delay)?;
        tasks::release(
            &self.db,
            &lease.task.id,
            &lease.token,
            next_run_at,
            true,
            self.clock.now(),
        )
        .await
    }

    async fn dead_letter(&self, lease: &Lease, reason: &str) -> Result<(), WaflowError> {
        tasks::dead_letter(&self.db, &lease.task.id, &lease.token, reason, self.clock.now())
            .await?;
        warn!(
            task_id = %lease.task.id,
            key = %lease.task.idempotency_key,
            kind = %lease.task.kind(),
            reason,
            "task dead-lettered"
        );
        Ok(())
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, WaflowError> {
        tasks::list_dead_letters(&self.db, limit).await
    }

    async fn replay(&self, task_id: &TaskId) -> Result<Task, WaflowError> {
        let task = tasks::replay(&self.db, task_id, self.clock.now()).await?;
        info!(task_id = %task.id, key = %task.idempotency_key, "dead letter replayed");
        Ok(task)
    }

    async fn stats(&self) -> Result<Vec<QueueStats>, WaflowError> {
        tasks::queue_stats(&self.db).await
    }
}
