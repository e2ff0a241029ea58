// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use waflow_core::{Backoff, Broker, Clock, IdempotencyKey, Queue, StateStore, Task, TaskPayload};
use waflow_cron::{PeriodicScheduler, SchedulerSettings};
use waflow_dispatch::{DispatchSettings, TaskDispatcher};
use waflow_test_utils::{FaultyBroker, TestHarness};

fn settings(batch_size: usize) -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: Duration::from_millis(50),
        cooldown: ChronoDuration::days(7),
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        batch_size,
    }
}

fn dispatch_settings() -> DispatchSettings {
    DispatchSettings {
        publish_timeout: Duration::from_millis(500),
        publish_retries: 1,
        publish_backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(10)),
        max_attempts: 3,
    }
}

fn scheduler(h: &TestHarness, broker: Arc<dyn Broker>, s: SchedulerSettings) -> PeriodicScheduler {
    let dispatcher = TaskDispatcher::new(broker, h.clock_dyn(), dispatch_settings());
    PeriodicScheduler::new(h.store_dyn(), dispatcher, h.clock_dyn(), s)
}

async fn drain_outreach(h: &TestHarness) -> Vec<Task> {
    let mut tasks = Vec::new();
    while let Some(lease) = h
        .broker
        .fetch(Queue::OutreachBatch, Duration::from_secs(30))
        .await
        .unwrap()
    {
        tasks.push(lease.task);
    }
    tasks
}

#[tokio::test]
async fn client_past_cooldown_gets_one_task_and_is_marked() {
    let h = TestHarness::new().await.unwrap();
    let now = h.clock.now();
    let due = h.add_client("+15550001", "Ana").await.unwrap();
    let recent = h.add_client("+15550002", "Ben").await.unwrap();
    let cooldown = ChronoDuration::days(7);
    assert!(
        h.store
            .mark_contacted(&due.id, now - ChronoDuration::days(10), cooldown)
            .await
            .unwrap()
    );
    assert!(
        h.store
            .mark_contacted(&recent.id, now - ChronoDuration::days(2), cooldown)
            .await
            .unwrap()
    );

    let sched = scheduler(&h, h.broker_dyn(), settings(1));
    let report = sched.tick().await.unwrap().unwrap();
    assert_eq!(report.eligible, 1);
    assert_eq!(report.submitted, 1);
    assert_eq!(report.marked, 1);

    let tasks = drain_outreach(&h).await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[0].idempotency_key,
        IdempotencyKey::outreach(&due.id, &report.cycle)
    );
    let stored = h.store.client(&due.id).await.unwrap().unwrap();
    assert_eq!(stored.last_contacted_at, Some(now));
    let untouched = h.store.client(&recent.id).await.unwrap().unwrap();
    assert_eq!(untouched.last_contacted_at, Some(now - ChronoDuration::days(2)));
}

#[tokio::test]
async fn every_eligible_client_gets_a_distinct_task() {
    let h = TestHarness::new().await.unwrap();
    for i in 0..5 {
        h.add_client(&format!("+1555000{i}"), &format!("client {i}"))
            .await
            .unwrap();
    }
    let opted_out = h.store.upsert_client("+15559999", None, false).await.unwrap();

    let sched = scheduler(&h, h.broker_dyn(), settings(1));
    let report = sched.tick().await.unwrap().unwrap();
    assert_eq!(report.eligible, 5);
    assert_eq!(report.submitted, 5);

    let tasks = drain_outreach(&h).await;
    let keys: HashSet<_> = tasks.iter().map(|t| t.idempotency_key.clone()).collect();
    assert_eq!(keys.len(), 5);
    for task in &tasks {
        let TaskPayload::OutreachBatch(batch) = &task.payload else {
            panic!("unexpected payload {:?}", task.payload);
        };
        assert!(!batch.client_ids.contains(&opted_out.id));
    }
}

#[tokio::test]
async fn second_tick_in_same_cycle_submits_nothing() {
    let h = TestHarness::new().await.unwrap();
    h.add_client("+15550001", "Ana").await.unwrap();
    let sched = scheduler(&h, h.broker_dyn(), settings(1));

    let first = sched.tick().await.unwrap().unwrap();
    assert_eq!(first.submitted, 1);
    h.clock.advance(ChronoDuration::minutes(1));
    let second = sched.tick().await.unwrap().unwrap();
    assert_eq!(second.eligible, 0);
    assert_eq!(second.submitted, 0);
    assert_eq!(drain_outreach(&h).await.len(), 1);
}

#[tokio::test]
async fn short_cooldown_contacts_again_within_the_day() {
    let h = TestHarness::new().await.unwrap();
    let client = h.add_client("+15550001", "Ana").await.unwrap();
    let hourly = SchedulerSettings {
        cooldown: ChronoDuration::hours(1),
        ..settings(1)
    };
    let sched = scheduler(&h, h.broker_dyn(), hourly);

    let first = sched.tick().await.unwrap().unwrap();
    assert_eq!(first.submitted, 1);
    h.clock.advance(ChronoDuration::hours(2));
    let second = sched.tick().await.unwrap().unwrap();
    assert_eq!(second.eligible, 1);
    assert_eq!(second.submitted, 1);
    assert_eq!(second.duplicates, 0);
    assert_eq!(second.marked, 1);
    assert_ne!(first.cycle, second.cycle);

    let tasks = drain_outreach(&h).await;
    assert_eq!(tasks.len(), 2);
    let keys: HashSet<_> = tasks.iter().map(|t| t.idempotency_key.clone()).collect();
    assert!(keys.contains(&IdempotencyKey::outreach(&client.id, &first.cycle)));
    assert!(keys.contains(&IdempotencyKey::outreach(&client.id, &second.cycle)));
}

#[tokio::test]
async fn clients_are_batched() {
    let h = TestHarness::new().await.unwrap();
    for i in 0..5 {
        h.add_client(&format!("+1555100{i}"), "x").await.unwrap();
    }
    let sched = scheduler(&h, h.broker_dyn(), settings(2));
    let report = sched.tick().await.unwrap().unwrap();
    assert_eq!(report.submitted, 3);
    assert_eq!(report.marked, 5);

    let mut sizes: Vec<usize> = drain_outreach(&h)
        .await
        .iter()
        .map(|t| match &t.payload {
            TaskPayload::OutreachBatch(b) => b.client_ids.len(),
            other => panic!("unexpected payload {other:?}"),
        })
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![1, 2, 2]);
}

#[tokio::test]
async fn failed_submission_leaves_client_eligible() {
    let h = TestHarness::new().await.unwrap();
    let client = h.add_client("+15550001", "Ana").await.unwrap();
    let down: Arc<dyn Broker> = Arc::new(FaultyBroker::down(h.broker_dyn()));
    let sched = scheduler(&h, down, settings(1));

    let report = sched.tick().await.unwrap().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.marked, 0);
    let stored = h.store.client(&client.id).await.unwrap().unwrap();
    assert_eq!(stored.last_contacted_at, None);

    // The next tick with a healthy broker picks the client up.
    let sched = scheduler(&h, h.broker_dyn(), settings(1));
    assert_eq!(sched.tick().await.unwrap().unwrap().submitted, 1);
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let h = TestHarness::new().await.unwrap();
    h.add_client("+15550001", "Ana").await.unwrap();
    let slow = SchedulerSettings {
        jitter_min: Duration::from_millis(200),
        jitter_max: Duration::from_millis(200),
        ..settings(1)
    };
    let sched = scheduler(&h, h.broker_dyn(), slow);

    let (a, b) = tokio::join!(sched.tick(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        sched.tick().await
    });
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_none());
    assert_eq!(drain_outreach(&h).await.len(), 1);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let h = TestHarness::new().await.unwrap();
    h.add_client("+15550001", "Ana").await.unwrap();
    let sched = Arc::new(scheduler(&h, h.broker_dyn(), settings(1)));
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(sched.clone().run(cancel.clone()));

    // The first interval tick fires immediately.
    let mut tasks = Vec::new();
    for _ in 0..50 {
        tasks = drain_outreach(&h).await;
        if !tasks.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(tasks.len(), 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
