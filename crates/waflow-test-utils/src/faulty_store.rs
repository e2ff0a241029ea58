// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store wrapper that injects write failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use waflow_core::{
    AdapterType, AppendOutcome, Client, ClientId, Conversation, ConversationId,
    ConversationMessage, HealthStatus, IdempotencyKey, InboundEvent, JobRun, NewMessage,
    PluginAdapter, StateStore, SummaryClaim, SummaryTicket, WaflowError,
};

/// A store that fails the first N message appends with a storage error.
///
/// Everything else passes through to the wrapped store.
pub struct FaultyStore {
    inner: Arc<dyn StateStore>,
    append_failures: AtomicU32,
    appends: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            append_failures: AtomicU32::new(0),
            appends: AtomicU32::new(0),
        }
    }

    /// The next `n` appends fail.
    pub fn failing_appends(self, n: u32) -> Self {
        self.append_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Append attempts seen so far, failed ones included.
    pub fn appends(&self) -> u32 {
        self.appends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn upsert_client(
        &self,
        contact: &str,
        display_name: Option<&str>,
        opted_in: bool,
    ) -> Result<Client, WaflowError> {
        self.inner.upsert_client(contact, display_name, opted_in).await
    }

    async fn ensure_client(&self, contact: &str) -> Result<Client, WaflowError> {
        self.inner.ensure_client(contact).await
    }

    async fn client(&self, id: &ClientId) -> Result<Option<Client>, WaflowError> {
        self.inner.client(id).await
    }

    async fn eligible_clients(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Vec<Client>, WaflowError> {
        self.inner.eligible_clients(now, cooldown).await
    }

    async fn mark_contacted(
        &self,
        id: &ClientId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<bool, WaflowError> {
        self.inner.mark_contacted(id, now, cooldown).await
    }

    async fn record_delivery(&self, id: &ClientId, at: DateTime<Utc>) -> Result<(), WaflowError> {
        self.inner.record_delivery(id, at).await
    }

    async fn open_conversation(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Conversation, WaflowError> {
        self.inner.open_conversation(client, now).await
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, WaflowError> {
        self.inner.conversation(id).await
    }

    async fn close_conversation(&self, id: &ConversationId) -> Result<bool, WaflowError> {
        self.inner.close_conversation(id).await
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        message: &NewMessage,
    ) -> Result<AppendOutcome, WaflowError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .append_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(WaflowError::storage(std::io::Error::other("disk I/O error")));
        }
        self.inner.append_message(conversation, message).await
    }

    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<ConversationMessage>, WaflowError> {
        self.inner.messages(conversation).await
    }

    async fn request_summary(
        &self,
        conversation: &ConversationId,
    ) -> Result<SummaryTicket, WaflowError> {
        self.inner.request_summary(conversation).await
    }

    async fn begin_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<SummaryClaim, WaflowError> {
        self.inner.begin_summary(conversation, cycle).await
    }

    async fn complete_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
        summary: &str,
        covered_messages: i64,
    ) -> Result<bool, WaflowError> {
        self.inner
            .complete_summary(conversation, cycle, summary, covered_messages)
            .await
    }

    async fn fail_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<bool, WaflowError> {
        self.inner.fail_summary(conversation, cycle).await
    }

    async fn has_success(&self, key: &IdempotencyKey) -> Result<bool, WaflowError> {
        self.inner.has_success(key).await
    }

    async fn record_job_run(&self, run: &JobRun) -> Result<(), WaflowError> {
        self.inner.record_job_run(run).await
    }

    async fn job_runs(&self, key: &IdempotencyKey) -> Result<Vec<JobRun>, WaflowError> {
        self.inner.job_runs(key).await
    }

    async fn archive_inbound_event(&self, event: &InboundEvent) -> Result<(), WaflowError> {
        self.inner.archive_inbound_event(event).await
    }
}
