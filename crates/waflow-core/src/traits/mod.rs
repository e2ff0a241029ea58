// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits for the collaborators the pipeline talks to.

pub mod adapter;
pub mod broker;
pub mod gateway;
pub mod store;
pub mod summarizer;

pub use adapter::PluginAdapter;
pub use broker::{Broker, Delivery, Lease};
pub use gateway::MessageGateway;
pub use store::StateStore;
pub use summarizer::Summarizer;
