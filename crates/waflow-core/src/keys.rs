// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic idempotency keys and outreach cycle identifiers.
//!
//! Keys are derived only from business identifiers, so a caller that retries a
//! submission produces the same key and the broker turns the retry into a no-op.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ClientId, ConversationId};

/// A key identifying one logical unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Scheduled message to `client` in outreach `cycle`.
    pub fn send(client: &ClientId, cycle: &str) -> Self {
        Self(format!("send:{client}:{cycle}"))
    }

    /// An ad-hoc message not tied to a cycle. `nonce` must be unique per request.
    pub fn send_direct(client: &ClientId, nonce: &str) -> Self {
        Self(format!("send-direct:{client}:{nonce}"))
    }

    /// Outreach for a single client in `cycle`.
    pub fn outreach(client: &ClientId, cycle: &str) -> Self {
        Self(format!("outreach:{client}:{cycle}"))
    }

    /// Outreach for a batch of clients in `cycle`.
    ///
    /// The key covers the sorted, de-duplicated client ids, so the same batch
    /// built in a different order maps to the same key.
    pub fn outreach_batch(cycle: &str, clients: &[ClientId]) -> Self {
        let mut ids: Vec<&str> = clients.iter().map(|c| c.0.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let mut hasher = Sha256::new();
        for id in ids {
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        Self(format!("outreach-batch:{cycle}:{}", &digest[..16]))
    }

    /// Summarization cycle `cycle` of `conversation`.
    pub fn summarize(conversation: &ConversationId, cycle: i64) -> Self {
        Self(format!("summarize:{conversation}:c{cycle}"))
    }

    /// Rebuilds a key read back from storage.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outreach cycle containing `now`.
///
/// Cycles are consecutive `cooldown`-long windows counted from the Unix
/// epoch. A client contacted inside one window only becomes eligible again in
/// a later one, so every eligibility gets a key of its own. Whole-day windows
/// are named by their first UTC date, shorter ones by their start minute.
pub fn outreach_cycle(now: DateTime<Utc>, cooldown: Duration) -> String {
    let window = cooldown.num_seconds().max(1);
    let start_secs = now.timestamp().div_euclid(window) * window;
    let start = DateTime::<Utc>::from_timestamp(start_secs, 0).unwrap_or(now);
    if window % SECS_PER_DAY == 0 {
        start.format("%Y-%m-%d").to_string()
    } else {
        start.format("%Y-%m-%dT%H:%MZ").to_string()
    }
}

const SECS_PER_DAY: i64 = 86_400;
