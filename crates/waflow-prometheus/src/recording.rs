// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_histogram};

/// Register all Waflow metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "waflow_tasks_submitted_total",
        "Tasks submitted to the broker, by queue and outcome (accepted/duplicate/failed)"
    );
    describe_counter!(
        "waflow_tasks_completed_total",
        "Task executions finished, by kind and outcome (success/retrying/failure/skipped)"
    );
    describe_counter!(
        "waflow_webhooks_total",
        "Inbound webhooks, by result (accepted/unauthenticated/malformed/unavailable)"
    );
    describe_counter!(
        "waflow_scheduler_ticks_total",
        "Scheduler ticks, by result (completed/skipped/overlap)"
    );
    describe_counter!(
        "waflow_broker_reconnects_total",
        "Broker fetch failures that triggered a reconnect backoff"
    );
    describe_counter!(
        "waflow_delivery_bookkeeping_failures_total",
        "Messages the gateway accepted but the store failed to record"
    );
    describe_histogram!(
        "waflow_handler_latency_seconds",
        "Task handler latency in seconds, by kind"
    );
}
