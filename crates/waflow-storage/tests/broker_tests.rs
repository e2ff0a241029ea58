// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker behaviour against a real SQLite file.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use waflow_core::{
    Broker, ClientId, Clock, IdempotencyKey, PublishOutcome, Queue, SendMessagePayload, Task,
    TaskId, TaskPayload, WaflowError,
};
use waflow_storage::{Database, SqliteBroker, queries};

struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    fn advance(&self, by: chrono::Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-06-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

async fn setup() -> (tempfile::TempDir, SqliteBroker, Arc<TestClock>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.db");
    let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
    let clock = Arc::new(TestClock(Mutex::new(start())));
    let broker = SqliteBroker::new(db, clock.clone());
    (dir, broker, clock)
}

fn send_task(client: &str, max_attempts: u32) -> Task {
    let client_id = ClientId(client.to_string());
    Task::new(
        TaskPayload::SendMessage(SendMessagePayload {
            client_id: client_id.clone(),
            to: "+15550001".into(),
            body: "hello".into(),
            conversation_id: None,
            cycle: Some("2026-06-01".into()),
        }),
        IdempotencyKey::send(&client_id, "2026-06-01"),
        max_attempts,
        start(),
    )
}

const LEASE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn duplicate_key_is_not_enqueued_twice() {
    let (_dir, broker, _clock) = setup().await;
    let first = send_task("c-1", 3);
    let mut second = send_task("c-1", 3);
    second.id = waflow_core::TaskId::generate();

    assert_eq!(
        broker.publish(Queue::SendMessage, &first).await.unwrap(),
        PublishOutcome::Accepted
    );
    assert_eq!(
        broker.publish(Queue::SendMessage, &second).await.unwrap(),
        PublishOutcome::Duplicate
    );

    let stats = broker.stats().await.unwrap();
    let send = stats.iter().find(|s| s.queue == "send_message").unwrap();
    assert_eq!(send.enqueued, 1);
}

#[tokio::test]
async fn queues_are_isolated() {
    let (_dir, broker, _clock) = setup().await;
    broker
        .publish(Queue::SendMessage, &send_task("c-1", 3))
        .await
        .unwrap();
    assert!(broker.fetch(Queue::Summarize, LEASE).await.unwrap().is_none());
    assert!(broker.fetch(Queue::SendMessage, LEASE).await.unwrap().is_some());
}

#[tokio::test]
async fn leased_task_is_invisible_until_lease_expires() {
    let (_dir, broker, clock) = setup().await;
    let task = send_task("c-1", 3);
    broker.publish(Queue::SendMessage, &task).await.unwrap();

    let first = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(first.task.id, task.id);
    assert!(broker.fetch(Queue::SendMessage, LEASE).await.unwrap().is_none());

    clock.advance(chrono::Duration::seconds(61));
    let second = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(second.task.id, task.id);
    // Redelivery after a crash does not count as a failed attempt.
    assert_eq!(second.task.attempts, 0);
    assert_ne!(first.token, second.token);

    // The first consumer lost its lease and can no longer settle.
    let err = broker.ack(&first).await.unwrap_err();
    assert!(matches!(err, WaflowError::LeaseLost { .. }));
    broker.ack(&second).await.unwrap();
}

#[tokio::test]
async fn retry_counts_attempt_and_delays_redelivery() {
    let (_dir, broker, clock) = setup().await;
    broker
        .publish(Queue::SendMessage, &send_task("c-1", 3))
        .await
        .unwrap();

    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    broker.retry(&lease, Duration::from_secs(30)).await.unwrap();

    assert!(broker.fetch(Queue::SendMessage, LEASE).await.unwrap().is_none());
    clock.advance(chrono::Duration::seconds(30));
    let again = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(again.task.attempts, 1);
    assert_eq!(again.task.execution(), 2);
}

#[tokio::test]
async fn requeue_keeps_attempt_count() {
    let (_dir, broker, _clock) = setup().await;
    broker
        .publish(Queue::SendMessage, &send_task("c-1", 3))
        .await
        .unwrap();
    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    broker.requeue(&lease).await.unwrap();

    let again = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(again.task.attempts, 0);
}

#[tokio::test]
async fn dead_letter_then_replay() {
    let (_dir, broker, _clock) = setup().await;
    let task = send_task("c-1", 1);
    broker.publish(Queue::SendMessage, &task).await.unwrap();

    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    broker
        .dead_letter(&lease, "gateway rejected recipient")
        .await
        .unwrap();
    assert!(broker.fetch(Queue::SendMessage, LEASE).await.unwrap().is_none());

    let letters = broker.dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].task.id, task.id);
    assert_eq!(letters[0].task.attempts, 1);
    assert_eq!(letters[0].reason, "gateway rejected recipient");
    assert!(letters[0].replayed_at.is_none());

    let replayed = broker.replay(&task.id).await.unwrap();
    assert_eq!(replayed.attempts, 0);
    let letters = broker.dead_letters(10).await.unwrap();
    assert!(letters[0].replayed_at.is_some());

    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(lease.task.id, task.id);

    // Replaying a task that is not dead-lettered is refused.
    let err = broker.replay(&task.id).await.unwrap_err();
    assert!(matches!(err, WaflowError::NotFound(_)));
}

#[tokio::test]
async fn dead_letter_bookkeeping_tracks_each_round() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broker.db");
    let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
    let clock = Arc::new(TestClock(Mutex::new(start())));
    let broker = SqliteBroker::new(db.clone(), clock);
    let task = send_task("c-1", 1);
    broker.publish(Queue::SendMessage, &task).await.unwrap();
    assert_eq!(
        queries::tasks::task_state(&db, &task.id).await.unwrap().as_deref(),
        Some("enqueued")
    );

    for round in 1..=2u64 {
        let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
        broker.dead_letter(&lease, "boom").await.unwrap();
        assert_eq!(queries::dead_letters::count_pending(&db).await.unwrap(), 1);
        assert_eq!(
            queries::dead_letters::times_dead_lettered(&db, &task.id)
                .await
                .unwrap(),
            round
        );
        broker.replay(&task.id).await.unwrap();
        assert_eq!(queries::dead_letters::count_pending(&db).await.unwrap(), 0);
    }

    let missing = TaskId("nope".into());
    assert!(queries::tasks::task_state(&db, &missing).await.unwrap().is_none());
}

#[tokio::test]
async fn stats_report_every_queue() {
    let (_dir, broker, _clock) = setup().await;
    broker
        .publish(Queue::SendMessage, &send_task("c-1", 3))
        .await
        .unwrap();
    broker
        .publish(Queue::SendMessage, &send_task("c-2", 3))
        .await
        .unwrap();
    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    broker.ack(&lease).await.unwrap();

    let stats = broker.stats().await.unwrap();
    assert_eq!(stats.len(), Queue::ALL.len());
    let send = stats.iter().find(|s| s.queue == "send_message").unwrap();
    assert_eq!((send.enqueued, send.succeeded), (1, 1));
    let summarize = stats.iter().find(|s| s.queue == "summarize").unwrap();
    assert_eq!(summarize.enqueued, 0);
}

#[tokio::test]
async fn published_tasks_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("durable.db");
    let clock = Arc::new(TestClock(Mutex::new(start())));
    let task = send_task("c-1", 3);
    {
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        let broker = SqliteBroker::new(db.clone(), clock.clone());
        broker.publish(Queue::SendMessage, &task).await.unwrap();
        db.close().await.unwrap();
    }
    let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
    let broker = SqliteBroker::new(db, clock);
    let lease = broker.fetch(Queue::SendMessage, LEASE).await.unwrap().unwrap();
    assert_eq!(lease.task.id, task.id);
    assert_eq!(lease.task.payload, task.payload);
}
