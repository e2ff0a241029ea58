// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use waflow_core::{Backoff, Broker, ClientId, Queue, StateStore, TaskKind, TaskPayload, WaflowError};
use waflow_dispatch::{DispatchSettings, Submission, TaskDispatcher};
use waflow_test_utils::{FaultyBroker, TestHarness};

fn settings(retries: u32) -> DispatchSettings {
    DispatchSettings {
        publish_timeout: Duration::from_millis(200),
        publish_retries: retries,
        publish_backoff: Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
        max_attempts: 3,
    }
}

#[tokio::test]
async fn resubmission_is_a_soft_duplicate() {
    let harness = TestHarness::new().await.unwrap();
    let client = harness.add_client("+15550001", "Ana").await.unwrap();
    let dispatcher = TaskDispatcher::new(harness.broker_dyn(), harness.clock_dyn(), settings(0));

    let first = dispatcher
        .submit_send_message(&client, "hello", "2026-06-01")
        .await
        .unwrap();
    assert!(matches!(first, Submission::Accepted(_)));

    let second = dispatcher
        .submit_send_message(&client, "hello again", "2026-06-01")
        .await
        .unwrap();
    assert_eq!(second, Submission::Duplicate);

    // A new cycle is new work.
    let next_cycle = dispatcher
        .submit_send_message(&client, "hello", "2026-06-08")
        .await
        .unwrap();
    assert!(matches!(next_cycle, Submission::Accepted(_)));
}

#[tokio::test]
async fn direct_messages_are_never_deduplicated() {
    let harness = TestHarness::new().await.unwrap();
    let client = harness.add_client("+15550001", "Ana").await.unwrap();
    let dispatcher = TaskDispatcher::new(harness.broker_dyn(), harness.clock_dyn(), settings(0));

    let first = dispatcher
        .submit_direct_message(&client, "your order shipped", None)
        .await
        .unwrap();
    let second = dispatcher
        .submit_direct_message(&client, "your order shipped", None)
        .await
        .unwrap();
    assert!(matches!(first, Submission::Accepted(_)));
    assert!(matches!(second, Submission::Accepted(_)));
    assert_ne!(first.task_id(), second.task_id());

    let lease = harness
        .broker
        .fetch(Queue::SendMessage, Duration::from_secs(30))
        .await
        .unwrap()
        .expect("direct message queued");
    assert!(lease.task.idempotency_key.as_str().starts_with("send-direct:"));
    match &lease.task.payload {
        TaskPayload::SendMessage(p) => assert!(p.cycle.is_none()),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn tasks_land_on_their_kind_queue_with_attempt_budget() {
    let harness = TestHarness::new().await.unwrap();
    let dispatcher = TaskDispatcher::new(harness.broker_dyn(), harness.clock_dyn(), settings(0));
    let conv = waflow_core::ConversationId("conv-1".into());

    dispatcher.submit_summarize(&conv, "wamid.7", 2).await.unwrap();

    let lease = harness
        .broker
        .fetch(Queue::Summarize, Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lease.task.kind(), TaskKind::Summarize);
    assert_eq!(lease.task.routing_key, "summarize");
    assert_eq!(lease.task.max_attempts, 3);
    assert_eq!(lease.task.idempotency_key.as_str(), "summarize:conv-1:c2");
    match &lease.task.payload {
        TaskPayload::Summarize(p) => {
            assert_eq!(p.cycle, 2);
            assert_eq!(p.through_message_id, "wamid.7");
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn outreach_keys_single_clients_and_batches_differently() {
    let harness = TestHarness::new().await.unwrap();
    let dispatcher = TaskDispatcher::new(harness.broker_dyn(), harness.clock_dyn(), settings(0));
    let a = ClientId("a".into());
    let b = ClientId("b".into());

    dispatcher.submit_outreach("2026-06-01", &[a.clone()]).await.unwrap();
    dispatcher
        .submit_outreach("2026-06-01", &[b.clone(), a.clone()])
        .await
        .unwrap();
    let again = dispatcher
        .submit_outreach("2026-06-01", &[a.clone(), b.clone()])
        .await
        .unwrap();
    assert_eq!(again, Submission::Duplicate);

    let lease = harness
        .broker
        .fetch(Queue::OutreachBatch, Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert!(
        lease.task.idempotency_key.as_str().starts_with("outreach:")
            || lease.task.idempotency_key.as_str().starts_with("outreach-batch:")
    );
    let stats = harness.broker.stats().await.unwrap();
    let outreach = stats.iter().find(|s| s.queue == "outreach_batch").unwrap();
    assert_eq!(outreach.enqueued + outreach.in_flight, 2);
}

#[tokio::test]
async fn unavailable_broker_is_retried_until_confirmed() {
    let harness = TestHarness::new().await.unwrap();
    let client = harness.add_client("+15550001", "Ana").await.unwrap();
    let broker = Arc::new(FaultyBroker::new(harness.broker_dyn()).failing_publishes(2));
    let dispatcher = TaskDispatcher::new(broker.clone(), harness.clock_dyn(), settings(3));

    let outcome = dispatcher
        .submit_send_message(&client, "hello", "2026-06-01")
        .await
        .unwrap();
    assert!(matches!(outcome, Submission::Accepted(_)));
    assert_eq!(broker.publishes(), 3);
}

#[tokio::test]
async fn exhausted_publish_retries_surface_broker_unavailable() {
    let harness = TestHarness::new().await.unwrap();
    let client = harness.add_client("+15550001", "Ana").await.unwrap();
    let broker = Arc::new(FaultyBroker::new(harness.broker_dyn()).failing_publishes(10));
    let dispatcher = TaskDispatcher::new(broker.clone(), harness.clock_dyn(), settings(2));

    let err = dispatcher
        .submit_send_message(&client, "hello", "2026-06-01")
        .await
        .unwrap_err();
    assert!(matches!(err, WaflowError::BrokerUnavailable { .. }));
    assert_eq!(broker.publishes(), 3);

    // Nothing reached the real queue.
    let stats = harness.broker.stats().await.unwrap();
    assert!(stats.iter().all(|s| s.enqueued == 0));
    // Store untouched as well.
    let stored = harness.store.client(&client.id).await.unwrap().unwrap();
    assert!(stored.last_contacted_at.is_none());
}

#[tokio::test]
async fn unconfirmed_publish_times_out_as_unavailable() {
    let harness = TestHarness::new().await.unwrap();
    let client = harness.add_client("+15550001", "Ana").await.unwrap();
    let broker = Arc::new(
        FaultyBroker::new(harness.broker_dyn())
            .failing_publishes(1)
            .stalling(Duration::from_secs(5)),
    );
    let dispatcher = TaskDispatcher::new(broker.clone(), harness.clock_dyn(), settings(0));

    let err = dispatcher
        .submit_send_message(&client, "hello", "2026-06-01")
        .await
        .unwrap_err();
    assert!(matches!(err, WaflowError::BrokerUnavailable { .. }));
}
