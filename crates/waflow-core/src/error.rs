// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Waflow orchestration core.

use thiserror::Error;

/// The primary error type used across all Waflow adapter traits and components.
///
/// Variants follow the pipeline's failure taxonomy: ingress errors reject a
/// single request, broker errors surface to the submitting caller, and handler
/// errors are classified as transient (retried) or permanent (dead-lettered).
#[derive(Debug, Error)]
pub enum WaflowError {
    /// Webhook authenticity check failed (bad or missing signature, wrong key).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Webhook body could not be decoded or lacks required fields.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A task with the same idempotency key was already accepted.
    ///
    /// Soft error: callers log it and carry on.
    #[error("duplicate submission for idempotency key `{key}`")]
    DuplicateSubmission { key: String },

    /// The broker could not be reached or did not confirm in time.
    #[error("broker unavailable: {message}")]
    BrokerUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The broker rejected a publish outright.
    #[error("publish to queue `{queue}` failed: {message}")]
    Publish { queue: String, message: String },

    /// A handler failed in a way worth retrying (timeout, 5xx, rate limit).
    #[error("transient handler failure: {message}")]
    TransientHandler {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A handler failed in a way that will not improve on retry (4xx, bad input).
    #[error("permanent handler failure: {message}")]
    PermanentHandler {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A settlement (ack, retry, dead-letter) carried a lease the broker no
    /// longer recognizes: the delivery expired and was handed to another consumer.
    #[error("lease lost for task `{task_id}`")]
    LeaseLost { task_id: String },

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The scheduler could not compute the eligible client set.
    #[error("scheduler query failed: {0}")]
    SchedulerQuery(String),

    /// Configuration errors (invalid TOML, missing secrets, bad key material).
    #[error("configuration error: {0}")]
    Config(String),

    /// State store errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WaflowError {
    /// Shorthand for a transient handler error without a source.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientHandler {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a permanent handler error without a source.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentHandler {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a broker availability error without a source.
    pub fn broker_unavailable(message: impl Into<String>) -> Self {
        Self::BrokerUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    ///
    /// Timeouts, broker outages, and storage hiccups count as transient so a
    /// worker never dead-letters a task because of its own infrastructure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientHandler { .. }
                | Self::BrokerUnavailable { .. }
                | Self::Timeout { .. }
                | Self::Storage { .. }
        )
    }
}
