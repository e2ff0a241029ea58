// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes a [`crate::Database`] and runs one
//! closure on the single writer thread; multi-statement operations run inside
//! a transaction within that closure.

pub mod clients;
pub mod conversations;
pub mod dead_letters;
pub mod inbound_events;
pub mod job_runs;
pub mod tasks;
