// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker pool for Waflow.
//!
//! Workers pull deliveries from the broker, skip work whose idempotency key
//! already has a recorded success, run the handler for the task's kind under
//! a timeout, record a [`JobRun`](waflow_core::JobRun), and settle the
//! delivery:
//! - success: ack
//! - transient failure with attempts left: retry after exponential backoff
//! - permanent failure or exhausted attempts: dead-letter

pub mod handlers;
pub mod pool;
pub mod runner;
pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use waflow_config::WaflowConfig;
use waflow_core::{Backoff, RetryPolicy};

pub use handlers::{HandlerSettings, Handlers, render_template};
pub use pool::{PoolSpec, WorkerPool};
pub use runner::{Settlement, TaskRunner};
pub use shutdown::install_signal_handler;

/// Retry policy built from the `[retry]` section.
pub fn retry_policy(config: &WaflowConfig) -> RetryPolicy {
    RetryPolicy {
        backoff: Backoff::new(
            Duration::from_millis(config.retry.backoff_base_ms),
            Duration::from_millis(config.retry.backoff_cap_ms),
        )
        .with_jitter(config.retry.jitter_ratio),
    }
}

/// Handler settings built from the `[scheduler]` and `[summarizer]` sections.
pub fn handler_settings(config: &WaflowConfig) -> HandlerSettings {
    HandlerSettings {
        outreach_template: config.scheduler.outreach_template.clone(),
        max_input_chars: config.summarizer.max_input_chars,
    }
}

/// Builds a [`TaskRunner`] from configuration.
pub fn runner_from_config(
    config: &WaflowConfig,
    handlers: Handlers,
    store: Arc<dyn waflow_core::StateStore>,
    clock: Arc<dyn waflow_core::Clock>,
) -> TaskRunner {
    TaskRunner::new(
        handlers,
        store,
        clock,
        retry_policy(config),
        Duration::from_secs(config.worker.handler_timeout_secs),
        Duration::from_secs(config.worker.shutdown_grace_secs),
    )
}
