// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Waflow task orchestration core.
//!
//! This crate provides the task model, error taxonomy, idempotency keys,
//! retry policy, and the adapter traits (broker, state store, gateway,
//! summarizer) that every other crate in the workspace is written against.
//! It performs no I/O of its own.

pub mod clock;
pub mod error;
pub mod keys;
pub mod msisdn;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::WaflowError;
pub use keys::{IdempotencyKey, outreach_cycle};
pub use msisdn::{normalize_msisdn, wire_msisdn};
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use types::{
    AdapterType, AppendOutcome, Client, ClientId, Conversation, ConversationId,
    ConversationMessage, ConversationStatus, DeadLetter, Direction, HealthStatus, InboundEvent,
    JobOutcome, JobRun, NewMessage, NormalizedMessage, OutreachBatchPayload, PublishOutcome,
    Queue, QueueStats, SendMessagePayload, SummarizeInput, SummarizePayload, SummaryClaim,
    SummaryStatus, SummaryTicket, Task, TaskId, TaskKind, TaskPayload, TaskState, Verification,
};

// Re-export all adapter traits at crate root.
pub use traits::{Broker, Delivery, Lease, MessageGateway, PluginAdapter, StateStore, Summarizer};
