// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use waflow_config::model::SchedulerConfig;
use waflow_core::{ClientId, Clock, StateStore, WaflowError, outreach_cycle};
use waflow_dispatch::{Submission, TaskDispatcher};

/// Cadence, eligibility window, and submission pacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    /// Minimum time between two outreach contacts with the same client.
    pub cooldown: chrono::Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Clients per OutreachBatch task.
    pub batch_size: usize,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            cooldown: config.cooldown(),
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub cycle: String,
    pub eligible: usize,
    /// Batches newly accepted by the broker.
    pub submitted: usize,
    /// Batches the broker already had under the same key.
    pub duplicates: usize,
    /// Batches whose submission failed; their clients stay eligible.
    pub failed: usize,
    /// Clients whose `last_contacted_at` this tick advanced.
    pub marked: usize,
}

/// Clock-driven producer of outreach work.
pub struct PeriodicScheduler {
    store: Arc<dyn StateStore>,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    ticking: AtomicBool,
}

/// Clears the tick flag when the tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PeriodicScheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: TaskDispatcher,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            settings,
            ticking: AtomicBool::new(false),
        }
    }

    /// Runs ticks on the configured cadence until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.settings.tick_interval.as_secs(),
            cooldown_hours = self.settings.cooldown.num_hours(),
            batch_size = self.settings.batch_size,
            "outreach scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown during scheduler tick, remaining clients wait for the next run");
                    break;
                }
                result = self.tick() => match result {
                    Ok(Some(report)) => {
                        metrics::counter!("waflow_scheduler_ticks_total", "result" => "completed")
                            .increment(1);
                        debug!(?report, "scheduler tick finished");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        metrics::counter!("waflow_scheduler_ticks_total", "result" => "skipped")
                            .increment(1);
                        error!(error = %e, "scheduler tick skipped, retrying on next tick");
                    }
                },
            }
        }
        info!("outreach scheduler stopped");
    }

    /// Runs one tick now.
    ///
    /// Returns `Ok(None)` without doing anything if another tick is still
    /// running, and [`WaflowError::SchedulerQuery`] if the eligible set could
    /// not be read.
    pub async fn tick(&self) -> Result<Option<TickReport>, WaflowError> {
        if self.ticking.swap(true, Ordering::AcqRel) {
            metrics::counter!("waflow_scheduler_ticks_total", "result" => "overlap").increment(1);
            warn!("previous scheduler tick still running, skipping this one");
            return Ok(None);
        }
        let _guard = TickGuard(&self.ticking);

        let now = self.clock.now();
        let cycle = outreach_cycle(now, self.settings.cooldown);
        let eligible = self
            .store
            .eligible_clients(now, self.settings.cooldown)
            .await
            .map_err(|e| WaflowError::SchedulerQuery(e.to_string()))?;

        let mut report = TickReport {
            cycle: cycle.clone(),
            eligible: eligible.len(),
            ..TickReport::default()
        };
        if eligible.is_empty() {
            debug!(cycle = cycle.as_str(), "no clients due for outreach");
            return Ok(Some(report));
        }

        let ids: Vec<ClientId> = eligible.into_iter().map(|c| c.id).collect();
        for batch in ids.chunks(self.settings.batch_size) {
            self.pause().await;
            match self.dispatcher.submit_outreach(&cycle, batch).await {
                Ok(submission) => {
                    // A duplicate key is a submission from this same cooldown
                    // window whose marking never landed, so the work exists.
                    match submission {
                        Submission::Accepted(_) => report.submitted += 1,
                        Submission::Duplicate => report.duplicates += 1,
                    }
                    report.marked += self.mark_contacted(batch, now).await;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        cycle = cycle.as_str(),
                        clients = batch.len(),
                        error = %e,
                        "outreach submission failed, clients stay eligible"
                    );
                }
            }
        }

        info!(
            cycle = cycle.as_str(),
            eligible = report.eligible,
            submitted = report.submitted,
            duplicates = report.duplicates,
            failed = report.failed,
            "outreach tick complete"
        );
        Ok(Some(report))
    }

    /// Compare-and-set `last_contacted_at` for each client still eligible.
    async fn mark_contacted(&self, batch: &[ClientId], now: chrono::DateTime<chrono::Utc>) -> usize {
        let mut marked = 0;
        for id in batch {
            match self
                .store
                .mark_contacted(id, now, self.settings.cooldown)
                .await
            {
                Ok(true) => marked += 1,
                Ok(false) => debug!(client_id = %id, "client already marked by a concurrent tick"),
                Err(e) => warn!(client_id = %id, error = %e, "failed to mark client contacted"),
            }
        }
        marked
    }

    /// Random delay in `[jitter_min, jitter_max]` before a submission.
    async fn pause(&self) {
        let (min, max) = (self.settings.jitter_min, self.settings.jitter_max);
        if max.is_zero() || max < min {
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            Duration::from_millis(rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64))
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
