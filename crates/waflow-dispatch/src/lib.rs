// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task dispatcher for Waflow.
//!
//! [`TaskDispatcher`] is the only component that publishes to the broker.
//! A submission returns once the broker has confirmed the entry durably;
//! resubmitting the same logical work maps to the same idempotency key and
//! comes back as [`Submission::Duplicate`].

pub mod dispatcher;

pub use dispatcher::{DispatchSettings, Submission, TaskDispatcher};
