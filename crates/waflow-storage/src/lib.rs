// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Waflow.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. One database backs
//! both the [`SqliteStore`] (clients, conversations, job runs) and the
//! [`SqliteBroker`] (durable task queues and dead letters).

pub mod adapter;
pub mod broker;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use broker::SqliteBroker;
pub use database::Database;
