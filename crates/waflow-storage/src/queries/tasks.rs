// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable task queue operations backing the SQLite broker.
//!
//! Every settlement matches on `(id, lease_token)` while the row is
//! `in_flight`, so a consumer whose lease expired cannot settle a task that
//! was redelivered to someone else.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use waflow_core::{
    DeadLetter, IdempotencyKey, PublishOutcome, Queue, QueueStats, Task, TaskId, TaskPayload,
    WaflowError,
};

use crate::database::{Database, fmt_ts, map_tr_err, parse_json, parse_ts, to_json};

const TASK_COLUMNS: &str =
    "id, idempotency_key, payload, routing_key, attempts, max_attempts, created_at, next_run_at";

pub(crate) fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task, rusqlite::Error> {
    let key: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    let next_run_at: String = row.get(7)?;
    Ok(Task {
        id: TaskId(row.get(0)?),
        idempotency_key: IdempotencyKey::from_stored(key),
        payload: parse_json::<TaskPayload>(2, &payload)?,
        routing_key: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        created_at: parse_ts(6, &created_at)?,
        next_run_at: parse_ts(7, &next_run_at)?,
    })
}

/// Insert `task` on `queue` unless its idempotency key is already known.
pub async fn publish(
    db: &Database,
    queue: Queue,
    task: &Task,
    now: DateTime<Utc>,
) -> Result<PublishOutcome, WaflowError> {
    let payload = to_json(&task.payload)?;
    let task = task.clone();
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "INSERT INTO tasks (id, idempotency_key, queue, kind, payload, routing_key,
                                    state, attempts, max_attempts, created_at, next_run_at,
                                    updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'enqueued', ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT (idempotency_key) DO NOTHING",
                params![
                    task.id.0,
                    task.idempotency_key.as_str(),
                    queue.name(),
                    task.kind().to_string(),
                    payload,
                    task.routing_key,
                    task.attempts,
                    task.max_attempts,
                    fmt_ts(task.created_at),
                    fmt_ts(task.next_run_at),
                    now,
                ],
            )?;
            tx.commit()?;
            Ok(if changed == 1 {
                PublishOutcome::Accepted
            } else {
                PublishOutcome::Duplicate
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest ready task on `queue`: enqueued and due, or in flight
/// with an expired lease.
pub async fn claim(
    db: &Database,
    queue: Queue,
    token: &str,
    now: DateTime<Utc>,
    locked_until: DateTime<Utc>,
) -> Result<Option<Task>, WaflowError> {
    let token = token.to_string();
    let now = fmt_ts(now);
    let locked_until = fmt_ts(locked_until);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let task = tx
                .query_row(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks
                         WHERE queue = ?1
                           AND ((state = 'enqueued' AND next_run_at <= ?2)
                             OR (state = 'in_flight' AND locked_until <= ?2))
                         ORDER BY next_run_at ASC, created_at ASC
                         LIMIT 1"
                    ),
                    params![queue.name(), now],
                    row_to_task,
                )
                .optional()?;

            if let Some(task) = &task {
                tx.execute(
                    "UPDATE tasks SET state = 'in_flight', lease_token = ?2,
                         locked_until = ?3, updated_at = ?4
                     WHERE id = ?1",
                    params![task.id.0, token, locked_until, now],
                )?;
            }
            tx.commit()?;
            Ok(task)
        })
        .await
        .map_err(map_tr_err)
}

fn lease_lost(task_id: &TaskId) -> WaflowError {
    WaflowError::LeaseLost {
        task_id: task_id.0.clone(),
    }
}

/// Mark a leased task succeeded.
pub async fn ack(
    db: &Database,
    task_id: &TaskId,
    token: &str,
    now: DateTime<Utc>,
) -> Result<(), WaflowError> {
    let (id, token, now) = (task_id.0.clone(), token.to_string(), fmt_ts(now));
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tasks SET state = 'succeeded', lease_token = NULL,
                     locked_until = NULL, updated_at = ?3
                 WHERE id = ?1 AND state = 'in_flight' AND lease_token = ?2",
                params![id, token, now],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 1 { Ok(()) } else { Err(lease_lost(task_id)) }
}

/// Put a leased task back on its queue, due at `next_run_at`.
///
/// With `count_attempt` the failed execution is counted against the budget.
pub async fn release(
    db: &Database,
    task_id: &TaskId,
    token: &str,
    next_run_at: DateTime<Utc>,
    count_attempt: bool,
    now: DateTime<Utc>,
) -> Result<(), WaflowError> {
    let (id, token) = (task_id.0.clone(), token.to_string());
    let (next_run_at, now) = (fmt_ts(next_run_at), fmt_ts(now));
    let increment: u32 = count_attempt.into();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tasks SET state = 'enqueued', attempts = attempts + ?3,
                     next_run_at = ?4, lease_token = NULL, locked_until = NULL,
                     updated_at = ?5
                 WHERE id = ?1 AND state = 'in_flight' AND lease_token = ?2",
                params![id, token, increment, next_run_at, now],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 1 { Ok(()) } else { Err(lease_lost(task_id)) }
}

/// Move a leased task to dead-letter storage in one transaction.
///
/// The failed execution is counted, the row becomes `dead_lettered`, and a
/// snapshot of the task as it stands is written to `dead_letters`.
pub async fn dead_letter(
    db: &Database,
    task_id: &TaskId,
    token: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), WaflowError> {
    let (id, token, reason, now) = (
        task_id.0.clone(),
        token.to_string(),
        reason.to_string(),
        fmt_ts(now),
    );
    let moved = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE tasks SET state = 'dead_lettered',
                     attempts = MIN(attempts + 1, max_attempts),
                     lease_token = NULL, locked_until = NULL, updated_at = ?3
                 WHERE id = ?1 AND state = 'in_flight' AND lease_token = ?2",
                params![id, token, now],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            let task = tx.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )?;
            let snapshot = serde_json::to_string(&task)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                "INSERT INTO dead_letters (task_id, reason, snapshot, dead_lettered_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, reason, snapshot, now],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if moved { Ok(()) } else { Err(lease_lost(task_id)) }
}

/// Dead letters, newest first.
pub async fn list_dead_letters(db: &Database, limit: usize) -> Result<Vec<DeadLetter>, WaflowError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT snapshot, reason, dead_lettered_at, replayed_at
                 FROM dead_letters ORDER BY dead_lettered_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let snapshot: String = row.get(0)?;
                let dead_lettered_at: String = row.get(2)?;
                let replayed_at: Option<String> = row.get(3)?;
                Ok(DeadLetter {
                    task: parse_json(0, &snapshot)?,
                    reason: row.get(1)?,
                    dead_lettered_at: parse_ts(2, &dead_lettered_at)?,
                    replayed_at: replayed_at.map(|s| parse_ts(3, &s)).transpose()?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Return a dead-lettered task to its queue with a fresh attempt budget.
pub async fn replay(db: &Database, task_id: &TaskId, now: DateTime<Utc>) -> Result<Task, WaflowError> {
    let id = task_id.0.clone();
    let now = fmt_ts(now);
    let task = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE tasks SET state = 'enqueued', attempts = 0, next_run_at = ?2,
                     lease_token = NULL, locked_until = NULL, updated_at = ?2
                 WHERE id = ?1 AND state = 'dead_lettered'",
                params![id, now],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            tx.execute(
                "UPDATE dead_letters SET replayed_at = ?2
                 WHERE task_id = ?1 AND replayed_at IS NULL",
                params![id, now],
            )?;
            let task = tx.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )?;
            tx.commit()?;
            Ok(Some(task))
        })
        .await
        .map_err(map_tr_err)?;
    task.ok_or_else(|| WaflowError::NotFound(format!("no dead-lettered task `{task_id}`")))
}

/// Counts per queue and state.
pub async fn queue_stats(db: &Database) -> Result<Vec<QueueStats>, WaflowError> {
    let counts: Vec<(String, String, u64)> = db
        .connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT queue, state, COUNT(*) FROM tasks GROUP BY queue, state")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    let mut stats: Vec<QueueStats> = Queue::ALL
        .iter()
        .map(|q| QueueStats {
            queue: q.name().to_string(),
            ..QueueStats::default()
        })
        .collect();
    for (queue, state, count) in counts {
        let Some(entry) = stats.iter_mut().find(|s| s.queue == queue) else {
            continue;
        };
        match state.as_str() {
            "enqueued" => entry.enqueued = count,
            "in_flight" => entry.in_flight = count,
            "succeeded" => entry.succeeded = count,
            "dead_lettered" => entry.dead_lettered = count,
            _ => {}
        }
    }
    Ok(stats)
}

/// Current state of a task, for tests and diagnostics.
pub async fn task_state(db: &Database, task_id: &TaskId) -> Result<Option<String>, WaflowError> {
    let id = task_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row("SELECT state FROM tasks WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
