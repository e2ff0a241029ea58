// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with cap and jitter, and the per-task retry decision.
//!
//! The same [`Backoff`] drives three loops: worker retries, dispatcher publish
//! retries, and broker reconnection.

use std::time::Duration;

use rand::Rng;

use crate::types::Task;

/// Exponential backoff: `min(cap, base * 2^(n-1))` plus up to `jitter_ratio`
/// of that delay chosen uniformly at random.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    /// Fraction of the capped delay added as random jitter (0.0 disables jitter).
    pub jitter_ratio: f64,
}

impl Backoff {
    /// Creates a backoff without jitter.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            jitter_ratio: 0.0,
        }
    }

    /// Sets the jitter ratio, clamped to `[0, 1]`.
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Deterministic part of the delay before retry number `n` (1-based).
    pub fn base_delay(&self, n: u32) -> Duration {
        let exponent = n.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Delay before retry number `n` (1-based), jitter included.
    pub fn delay<R: Rng + ?Sized>(&self, n: u32, rng: &mut R) -> Duration {
        let capped = self.base_delay(n);
        if self.jitter_ratio <= 0.0 || capped.is_zero() {
            return capped;
        }
        let max_jitter = capped.as_secs_f64() * self.jitter_ratio;
        capped + Duration::from_secs_f64(rng.gen_range(0.0..=max_jitter))
    }
}

/// What the worker should do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after the given delay.
    Retry(Duration),
    /// Attempts exhausted: move to dead-letter storage.
    DeadLetter,
}

/// Retry policy applied to every task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Decides the fate of `task` after its current execution failed transiently.
    ///
    /// The attempt budget is the task's own `max_attempts`, fixed at submission.
    pub fn decide<R: Rng + ?Sized>(&self, task: &Task, rng: &mut R) -> RetryDecision {
        if task.is_final_attempt() {
            RetryDecision::DeadLetter
        } else {
            RetryDecision::Retry(self.backoff.delay(task.execution(), rng))
        }
    }
}
