// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker consumption for Waflow.
//!
//! A [`Consumer`] turns the pull-based [`Broker`](waflow_core::Broker) into a
//! lazy, unbounded sequence of [`Delivery`](waflow_core::Delivery) values.
//! Nothing is fetched until the consumer is polled, and the sequence only
//! ends when its [`CancellationToken`](tokio_util::sync::CancellationToken)
//! fires. Fetch failures are treated as a lost connection and retried with
//! capped exponential backoff.

pub mod consumer;

pub use consumer::{Consumer, ConsumerSettings};
