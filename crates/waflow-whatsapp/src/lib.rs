// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp gateway adapter for Waflow.
//!
//! Sends text messages through a 360dialog-compatible HTTP API and maps
//! provider failures onto the transient/permanent handler error split the
//! worker retry policy relies on.

pub mod client;
pub mod types;

pub use client::WhatsAppGateway;
