// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a temp SQLite database shared by the state store
//! and the broker, a manual clock, and mock gateway/summarizer adapters.
//! Callers build dispatchers, workers, and schedulers on top of it.

use std::sync::Arc;
use std::time::Duration;

use waflow_config::WaflowConfig;
use waflow_core::{
    Broker, Client, ClientId, Clock, Conversation, JobRun, MessageGateway, StateStore,
    Summarizer, WaflowError,
};
use waflow_storage::{Database, SqliteBroker, SqliteStore};

use crate::clock::ManualClock;
use crate::mock_gateway::MockGateway;
use crate::mock_summarizer::MockSummarizer;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: WaflowConfig,
    summaries: Vec<String>,
    gateway_delay: Option<Duration>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = WaflowConfig::default();
        // Fast, deterministic retries for tests.
        config.retry.backoff_base_ms = 10;
        config.retry.backoff_cap_ms = 40;
        config.retry.jitter_ratio = 0.0;
        config.broker.poll_interval_ms = 10;
        config.broker.reconnect_base_ms = 10;
        config.broker.reconnect_cap_ms = 40;
        config.scheduler.jitter_min_ms = 0;
        config.scheduler.jitter_max_ms = 0;
        Self {
            config,
            summaries: Vec::new(),
            gateway_delay: None,
        }
    }

    /// Adjust the configuration before the harness is built.
    pub fn configure(mut self, f: impl FnOnce(&mut WaflowConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Set mock summarizer replies.
    pub fn with_summaries(mut self, summaries: Vec<String>) -> Self {
        self.summaries = summaries;
        self
    }

    /// Make every gateway call take `delay`.
    pub fn with_gateway_delay(mut self, delay: Duration) -> Self {
        self.gateway_delay = Some(delay);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(mut self) -> Result<TestHarness, WaflowError> {
        let temp_dir = tempfile::TempDir::new().map_err(WaflowError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        self.config.storage.database_path = db_path.to_string_lossy().to_string();

        let db = Database::open(&self.config.storage.database_path, true).await?;
        let clock = Arc::new(ManualClock::fixed());
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let store = Arc::new(SqliteStore::new(db.clone(), clock_dyn.clone()));
        let broker = Arc::new(SqliteBroker::new(db.clone(), clock_dyn));

        let mut gateway = MockGateway::new();
        if let Some(delay) = self.gateway_delay {
            gateway = gateway.with_delay(delay);
        }
        let summarizer = if self.summaries.is_empty() {
            MockSummarizer::new()
        } else {
            MockSummarizer::with_replies(self.summaries)
        };

        Ok(TestHarness {
            config: self.config,
            db,
            store,
            broker,
            clock,
            gateway: Arc::new(gateway),
            summarizer: Arc::new(summarizer),
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment over a temp SQLite file.
pub struct TestHarness {
    pub config: WaflowConfig,
    pub db: Database,
    pub store: Arc<SqliteStore>,
    pub broker: Arc<SqliteBroker>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<MockGateway>,
    pub summarizer: Arc<MockSummarizer>,
    // Kept alive so the database file outlives the harness.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn new() -> Result<Self, WaflowError> {
        Self::builder().build().await
    }

    pub fn store_dyn(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }

    pub fn broker_dyn(&self) -> Arc<dyn Broker> {
        self.broker.clone()
    }

    pub fn clock_dyn(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn gateway_dyn(&self) -> Arc<dyn MessageGateway> {
        self.gateway.clone()
    }

    pub fn summarizer_dyn(&self) -> Arc<dyn Summarizer> {
        self.summarizer.clone()
    }

    /// Register an opted-in client that has never been contacted.
    pub async fn add_client(&self, contact: &str, name: &str) -> Result<Client, WaflowError> {
        self.store.upsert_client(contact, Some(name), true).await
    }

    /// The client's open conversation, opening one if needed.
    pub async fn conversation_for(&self, client: &ClientId) -> Result<Conversation, WaflowError> {
        self.store.open_conversation(client, self.clock.now()).await
    }

    /// Number of archived inbound webhook events.
    pub async fn inbound_event_count(&self) -> Result<u64, WaflowError> {
        waflow_storage::queries::inbound_events::count_inbound_events(&self.db).await
    }

    /// Job runs recorded under `key`.
    pub async fn runs(&self, key: &waflow_core::IdempotencyKey) -> Result<Vec<JobRun>, WaflowError> {
        self.store.job_runs(key).await
    }
}
