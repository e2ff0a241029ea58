// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`StateStore`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use waflow_core::{
    AdapterType, AppendOutcome, Client, ClientId, Clock, Conversation, ConversationId,
    ConversationMessage, HealthStatus, IdempotencyKey, InboundEvent, JobRun, NewMessage,
    PluginAdapter, StateStore, SummaryClaim, SummaryTicket, WaflowError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed state store.
///
/// Shares its [`Database`] (and therefore its single writer thread) with the
/// broker, so store writes and queue writes never contend for the file lock.
pub struct SqliteStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Store
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        self.db.ping().await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        self.db.checkpoint().await?;
        debug!("store shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    // --- Clients ---

    async fn upsert_client(
        &self,
        contact: &str,
        display_name: Option<&str>,
        opted_in: bool,
    ) -> Result<Client, WaflowError> {
        queries::clients::upsert_client(&self.db, contact, display_name, opted_in, self.clock.now())
            .await
    }

    async fn ensure_client(&self, contact: &str) -> Result<Client, WaflowError> {
        queries::clients::ensure_client(&self.db, contact, self.clock.now()).await
    }

    async fn client(&self, id: &ClientId) -> Result<Option<Client>, WaflowError> {
        queries::clients::get_client(&self.db, id).await
    }

    async fn eligible_clients(
        &self,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<Vec<Client>, WaflowError> {
        queries::clients::eligible_clients(&self.db, now - cooldown).await
    }

    async fn mark_contacted(
        &self,
        id: &ClientId,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> Result<bool, WaflowError> {
        queries::clients::mark_contacted(&self.db, id, now, now - cooldown).await
    }

    async fn record_delivery(&self, id: &ClientId, at: DateTime<Utc>) -> Result<(), WaflowError> {
        queries::clients::record_delivery(&self.db, id, at).await
    }

    // --- Conversations ---

    async fn open_conversation(
        &self,
        client: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<Conversation, WaflowError> {
        queries::conversations::open_conversation(&self.db, client, now).await
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, WaflowError> {
        queries::conversations::get_conversation(&self.db, id).await
    }

    async fn close_conversation(&self, id: &ConversationId) -> Result<bool, WaflowError> {
        queries::conversations::close_conversation(&self.db, id).await
    }

    async fn append_message(
        &self,
        conversation: &ConversationId,
        message: &NewMessage,
    ) -> Result<AppendOutcome, WaflowError> {
        queries::conversations::append_message(&self.db, conversation, message).await
    }

    async fn messages(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<ConversationMessage>, WaflowError> {
        queries::conversations::list_messages(&self.db, conversation).await
    }

    async fn request_summary(
        &self,
        conversation: &ConversationId,
    ) -> Result<SummaryTicket, WaflowError> {
        queries::conversations::request_summary(&self.db, conversation).await
    }

    async fn begin_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<SummaryClaim, WaflowError> {
        queries::conversations::begin_summary(&self.db, conversation, cycle).await
    }

    async fn complete_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
        summary: &str,
        covered_messages: i64,
    ) -> Result<bool, WaflowError> {
        queries::conversations::complete_summary(
            &self.db,
            conversation,
            cycle,
            summary,
            covered_messages,
        )
        .await
    }

    async fn fail_summary(
        &self,
        conversation: &ConversationId,
        cycle: i64,
    ) -> Result<bool, WaflowError> {
        queries::conversations::fail_summary(&self.db, conversation, cycle).await
    }

    // --- Job runs ---

    async fn has_success(&self, key: &IdempotencyKey) -> Result<bool, WaflowError> {
        queries::job_runs::has_success(&self.db, key).await
    }

    async fn record_job_run(&self, run: &JobRun) -> Result<(), WaflowError> {
        queries::job_runs::record_job_run(&self.db, run).await
    }

    async fn job_runs(&self, key: &IdempotencyKey) -> Result<Vec<JobRun>, WaflowError> {
        queries::job_runs::job_runs_for_key(&self.db, key).await
    }

    // --- Ingress ---

    async fn archive_inbound_event(&self, event: &InboundEvent) -> Result<(), WaflowError> {
        queries::inbound_events::archive_inbound_event(&self.db, event).await
    }
}
