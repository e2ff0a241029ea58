// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Waflow integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`FaultyBroker`] - Broker wrapper that fails a scripted number of publishes or fetches
//! - [`FaultyStore`] - State store wrapper that fails a scripted number of message appends
//! - [`MockGateway`] - Outbound messaging gateway that records sends and replays scripted failures
//! - [`MockSummarizer`] - Summarization provider with queued replies
//! - [`ManualClock`] - Clock that only moves when told to
//! - [`TestHarness`] - Temp SQLite store and broker wired to the mocks

pub mod clock;
pub mod faulty_broker;
pub mod faulty_store;
pub mod harness;
pub mod mock_gateway;
pub mod mock_summarizer;

pub use clock::ManualClock;
pub use faulty_broker::FaultyBroker;
pub use faulty_store::FaultyStore;
pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_gateway::{MockGateway, SentText};
pub use mock_summarizer::MockSummarizer;

/// A failure a mock adapter has been told to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    Transient(String),
    Permanent(String),
}

impl ScriptedFailure {
    fn into_error(self) -> waflow_core::WaflowError {
        match self {
            ScriptedFailure::Transient(msg) => waflow_core::WaflowError::transient(msg),
            ScriptedFailure::Permanent(msg) => waflow_core::WaflowError::permanent(msg),
        }
    }
}
