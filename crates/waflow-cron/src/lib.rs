// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic outreach scheduler for Waflow.
//!
//! A single timer task wakes on a fixed cadence, asks the state store which
//! clients are due for outreach, and submits OutreachBatch tasks through the
//! dispatcher. Ticks never overlap: a tick that is still running when the
//! next one is due causes that next tick to be skipped.

pub mod scheduler;

pub use scheduler::{PeriodicScheduler, SchedulerSettings, TickReport};
