// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waflow dead-letters` command implementation.

use std::sync::Arc;

use waflow_config::WaflowConfig;
use waflow_core::{Broker, DeadLetter, SystemClock, TaskId, WaflowError};
use waflow_storage::{Database, SqliteBroker};

async fn open_broker(config: &WaflowConfig) -> Result<(Database, SqliteBroker), WaflowError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let broker = SqliteBroker::new(db.clone(), Arc::new(SystemClock));
    Ok((db, broker))
}

pub async fn run_list(config: &WaflowConfig, limit: usize, json: bool) -> Result<(), WaflowError> {
    let (db, broker) = open_broker(config).await?;
    let output = list(&broker, limit, json).await;
    db.close().await?;
    println!("{}", output?);
    Ok(())
}

pub async fn run_replay(config: &WaflowConfig, task_id: &str) -> Result<(), WaflowError> {
    let (db, broker) = open_broker(config).await?;
    let output = replay(&broker, task_id).await;
    db.close().await?;
    println!("{}", output?);
    Ok(())
}

/// Renders up to `limit` dead letters as a table or a JSON array.
pub async fn list(broker: &dyn Broker, limit: usize, json: bool) -> Result<String, WaflowError> {
    let letters = broker.dead_letters(limit).await?;
    if json {
        return serde_json::to_string_pretty(&letters)
            .map_err(|e| WaflowError::Internal(format!("failed to encode dead letters: {e}")));
    }
    Ok(render_table(&letters))
}

/// Replays one dead letter and describes the requeued task.
pub async fn replay(broker: &dyn Broker, task_id: &str) -> Result<String, WaflowError> {
    let task = broker.replay(&TaskId(task_id.to_string())).await?;
    Ok(format!(
        "replayed {} ({}) onto {} with a fresh budget of {} attempt(s)",
        task.id,
        task.idempotency_key,
        task.payload.kind().queue().name(),
        task.max_attempts
    ))
}

fn render_table(letters: &[DeadLetter]) -> String {
    if letters.is_empty() {
        return "no dead letters".to_string();
    }
    let mut out = format!(
        "{:<36}  {:<14}  {:<20}  {:<8}  {}\n",
        "TASK", "KIND", "DEAD-LETTERED", "REPLAYED", "REASON"
    );
    for letter in letters {
        out.push_str(&format!(
            "{:<36}  {:<14}  {:<20}  {:<8}  {}\n",
            letter.task.id,
            letter.task.payload.kind(),
            letter.dead_lettered_at.format("%Y-%m-%d %H:%M:%S"),
            if letter.replayed_at.is_some() { "yes" } else { "no" },
            letter.reason,
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use waflow_core::{Queue, SendMessagePayload, Task, TaskPayload};
    use waflow_core::{ClientId, Clock, IdempotencyKey};
    use waflow_test_utils::TestHarness;

    async fn dead_lettered(h: &TestHarness, reason: &str) -> Task {
        let client = ClientId("client-1".into());
        let task = Task::new(
            TaskPayload::SendMessage(SendMessagePayload {
                client_id: client.clone(),
                to: "+15550001".into(),
                body: "hello".into(),
                conversation_id: None,
                cycle: None,
            }),
            IdempotencyKey::send(&client, "2026-06-01"),
            3,
            h.clock.now(),
        );
        h.broker.publish(Queue::SendMessage, &task).await.unwrap();
        let lease = h
            .broker
            .fetch(Queue::SendMessage, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        h.broker.dead_letter(&lease, reason).await.unwrap();
        task
    }

    #[tokio::test]
    async fn empty_list_says_so() {
        let h = TestHarness::new().await.unwrap();
        assert_eq!(list(h.broker.as_ref(), 20, false).await.unwrap(), "no dead letters");
    }

    #[tokio::test]
    async fn table_lists_task_kind_and_reason() {
        let h = TestHarness::new().await.unwrap();
        let task = dead_lettered(&h, "gateway rejected recipient").await;
        let table = list(h.broker.as_ref(), 20, false).await.unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("TASK"));
        assert!(lines[1].contains(&task.id.to_string()));
        assert!(lines[1].contains("send_message"));
        assert!(lines[1].contains("gateway rejected recipient"));
    }

    #[tokio::test]
    async fn json_output_is_an_array_of_dead_letters() {
        let h = TestHarness::new().await.unwrap();
        dead_lettered(&h, "boom").await;
        let out = list(h.broker.as_ref(), 20, true).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["reason"], "boom");
    }

    #[tokio::test]
    async fn replay_puts_the_task_back_on_its_queue() {
        let h = TestHarness::new().await.unwrap();
        let task = dead_lettered(&h, "boom").await;
        let msg = replay(h.broker.as_ref(), &task.id.to_string()).await.unwrap();
        assert!(msg.contains("send_message"), "{msg}");

        let lease = h
            .broker
            .fetch(Queue::SendMessage, Duration::from_secs(30))
            .await
            .unwrap()
            .expect("replayed task is ready");
        assert_eq!(lease.task.id, task.id);
    }

    #[tokio::test]
    async fn replaying_an_unknown_task_fails() {
        let h = TestHarness::new().await.unwrap();
        assert!(replay(h.broker.as_ref(), "no-such-task").await.is_err());
    }
}
