// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store contract for clients, conversations, and the job-run audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WaflowError;
use crate::keys::IdempotencyKey;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AppendOutcome, Client, ClientId, Conversation, ConversationId, ConversationMessage,
    InboundEvent, JobRun, NewMessage, SummaryClaim, SummaryTicket,
};

/// The only component allowed to mutate client, conversation, and job-run records.
#[async_trait]
pub trait StateStore: PluginAdapter {
    // --- Clients ---

    /// Creates or updates the client with `contact`, returning the stored row.
    async fn upsert_client(
        &self,
        contact: &str,
        display_name: Option<&str>,
        opted_in: bool,
    ) -> Result<Client, WaflowError>;

    /// Returns the client with `contact`, creating it (not opted in) if unknown.
    async fn ensure_client(&self, contact: &str) -> Result<Client, WaflowError>;

    async fn client(&self, id: &ClientId) -> Result<Option<Client>, WaflowError>;

    /// Opted-in clients not contacted since `now - cooldown`, oldest contact first.
    async fn eligible_clients(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Vec<Client>, WaflowError>;

    /// Sets `last_contacted_at = now` only if the client is still eligible.
    ///
    /// Runs as one transaction. Returns false if another writer got there first.
    async fn mark_contacted(
        &self,
        id: &ClientId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<bool, WaflowError>;

    /// Records a confirmed delivery at `at`. Never moves `last_contacted_at` backwards.
    async fn record_delivery(&self, id: &ClientId, at: DateTime<Utc>) -> Result<(), WaflowError>;

    // --- Conversations ---

    /// Returns the client's open conversation, starting one if none exists.
    async fn open_conversation(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Conversation, WaflowError>;

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, WaflowError>;

    /// Closes an open conversation. Returns false if it was already closed or unknown.
    async fn close_conversation(&self, id: &ConversationId) -> Result<bool, WaflowError>;

    /// Appends a message at `max(seq) + 1`. Idempotent by message id.
    async fn append_message(
        &self,
        conversation: &ConversationId,
        message: &NewMessage,
    ) -> Result<AppendOutcome, WaflowError>;

    /// All messages of the conversation in sequence order.
    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<ConversationMessage>, WaflowError>;

    /// Explicit summarization request.
    ///
    /// Opens a new cycle (`Pending`) unless one is already pending or in progress,
    /// in which case the request joins it.
    async fn request_summary(
        &self,
        conversation: &ConversationId,
    ) -> Result<SummaryTicket, WaflowError>;

    /// Moves `cycle` from `Pending` to `InProgress`, or resumes it if already in progress.
    async fn begin_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<SummaryClaim, WaflowError>;

    /// Writes the summary and flips `cycle` to `Done`. Returns false if the cycle
    /// was not in progress.
    async fn complete_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
        summary: &str,
        covered_messages: i64,
    ) -> Result<bool, WaflowError>;

    /// Flips `cycle` to `Failed`. Returns false if the cycle had already ended.
    async fn fail_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<bool, WaflowError>;

    // --- Job runs ---

    /// True if a successful job run exists for `key`.
    async fn has_success(&self, key: &IdempotencyKey) -> Result<bool, WaflowError>;

    /// Appends a job run.
    ///
    /// A second success for the same key is rejected with
    /// [`WaflowError::DuplicateSubmission`].
    async fn record_job_run(&self, run: &JobRun) -> Result<(), WaflowError>;

    /// Job runs for `key` in completion order.
    async fn job_runs(&self, key: &IdempotencyKey) -> Result<Vec<JobRun>, WaflowError>;

    // --- Ingress ---

    /// Archives a verified inbound event after normalization.
    async fn archive_inbound_event(&self, event: &InboundEvent) -> Result<(), WaflowError>;
}
