// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event ingress for Waflow.
//!
//! Accepts WhatsApp webhooks over HTTP, verifies their HMAC signature,
//! optionally opens an AES-256-GCM envelope, appends the messages to the
//! sender's open conversation, and submits a summarize task once enough
//! unsummarized messages have accumulated. No handler work runs on the
//! request path.

pub mod crypto;
pub mod payload;
pub mod server;
pub mod service;

pub use server::{IngressState, MetricsRender, router, serve};
pub use service::{IngestReport, IngressService, IngressSettings};
