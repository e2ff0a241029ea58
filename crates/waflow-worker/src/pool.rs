// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-size worker pools, each consuming its own set of queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use waflow_broker::{Consumer, ConsumerSettings};
use waflow_core::{Broker, Queue};

use crate::runner::TaskRunner;

/// One isolated pool: a name, the queues it drains, and how many workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSpec {
    pub name: &'static str,
    pub queues: Vec<Queue>,
    pub workers: usize,
}

impl PoolSpec {
    /// Outreach (`send_message`, `outreach_batch`) and summarization pools.
    pub fn defaults(outreach_workers: usize, summarize_workers: usize) -> Vec<PoolSpec> {
        vec![
            PoolSpec {
                name: "outreach",
                queues: vec![Queue::SendMessage, Queue::OutreachBatch],
                workers: outreach_workers,
            },
            PoolSpec {
                name: "summarize",
                queues: vec![Queue::Summarize],
                workers: summarize_workers,
            },
        ]
    }
}

/// Running workers across all pools.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawns every worker of every pool. Workers stop when `cancel` fires.
    pub fn spawn(
        runner: Arc<TaskRunner>,
        broker: Arc<dyn Broker>,
        settings: ConsumerSettings,
        specs: &[PoolSpec],
        cancel: CancellationToken,
    ) -> Self {
        let mut handles = Vec::new();
        for spec in specs {
            info!(pool = spec.name, workers = spec.workers, queues = ?spec.queues, "starting worker pool");
            for index in 0..spec.workers {
                let consumer =
                    Consumer::new(broker.clone(), spec.queues.clone(), settings, cancel.clone());
                handles.push(tokio::spawn(run_worker(
                    spec.name,
                    index,
                    consumer,
                    runner.clone(),
                    cancel.clone(),
                )));
            }
        }
        Self { handles, cancel }
    }

    /// Number of running workers.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Cancels consumption and waits up to `timeout` for workers to exit.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        let count = self.handles.len();
        let join_all = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "worker task panicked");
                }
            }
        };
        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => info!(workers = count, "worker pools stopped"),
            Err(_) => warn!(workers = count, "timeout reached, some workers interrupted"),
        }
    }
}

async fn run_worker(
    pool: &'static str,
    index: usize,
    mut consumer: Consumer,
    runner: Arc<TaskRunner>,
    cancel: CancellationToken,
) {
    tracing::debug!(pool, worker = index, "worker started");
    while let Some(delivery) = consumer.next().await {
        let task_id = delivery.task().id.clone();
        match runner.process(delivery, &cancel).await {
            Ok(settlement) => {
                tracing::debug!(pool, worker = index, task_id = %task_id, ?settlement, "delivery settled");
            }
            Err(e) => {
                // Unsettled deliveries come back once their lease expires.
                warn!(pool, worker = index, task_id = %task_id, error = %e, "failed to settle delivery");
            }
        }
    }
    tracing::debug!(pool, worker = index, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pools_isolate_summarization() {
        let specs = PoolSpec::defaults(4, 2);
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].queues, vec![Queue::SendMessage, Queue::OutreachBatch]);
        assert_eq!(specs[1].queues, vec![Queue::Summarize]);
        assert_eq!(specs[0].workers + specs[1].workers, 6);
    }
}
