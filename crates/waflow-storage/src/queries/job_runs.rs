// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only job-run audit trail.

use rusqlite::params;
use waflow_core::{IdempotencyKey, JobRun, TaskId, WaflowError};

use crate::database::{Database, fmt_ts, map_tr_err, parse_enum, parse_ts};

/// Append a job run.
///
/// The partial unique index on successful runs makes a second success for the
/// same key a no-op, reported as [`WaflowError::DuplicateSubmission`].
pub async fn record_job_run(db: &Database, run: &JobRun) -> Result<(), WaflowError> {
    let run = run.clone();
    let key = run.idempotency_key.to_string();
    let inserted = db
        .connection()
        .call(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO job_runs
                     (id, task_id, idempotency_key, kind, attempt, outcome, error, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run.id,
                    run.task_id.0,
                    run.idempotency_key.as_str(),
                    run.kind.to_string(),
                    run.attempt,
                    run.outcome.to_string(),
                    run.error,
                    fmt_ts(run.completed_at),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)?;

    if inserted {
        Ok(())
    } else {
        Err(WaflowError::DuplicateSubmission { key })
    }
}

/// True if a successful run exists for `key`.
pub async fn has_success(db: &Database, key: &IdempotencyKey) -> Result<bool, WaflowError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM job_runs
                                WHERE idempotency_key = ?1 AND outcome = 'success')",
                params![key],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// All runs for `key`, oldest first.
pub async fn job_runs_for_key(
    db: &Database,
    key: &IdempotencyKey,
) -> Result<Vec<JobRun>, WaflowError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, idempotency_key, kind, attempt, outcome, error, completed_at
                 FROM job_runs WHERE idempotency_key = ?1
                 ORDER BY completed_at ASC, attempt ASC",
            )?;
            let rows = stmt.query_map(params![key], |row| {
                let key: String = row.get(2)?;
                let kind: String = row.get(3)?;
                let outcome: String = row.get(5)?;
                let completed_at: String = row.get(7)?;
                Ok(JobRun {
                    id: row.get(0)?,
                    task_id: TaskId(row.get(1)?),
                    idempotency_key: IdempotencyKey::from_stored(key),
                    kind: parse_enum(3, &kind)?,
                    attempt: row.get(4)?,
                    outcome: parse_enum(5, &outcome)?,
                    error: row.get(6)?,
                    completed_at: parse_ts(7, &completed_at)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use waflow_core::{ClientId, JobOutcome, SendMessagePayload, Task, TaskPayload};

    fn task() -> Task {
        Task::new(
            TaskPayload::SendMessage(SendMessagePayload {
                client_id: ClientId("c-1".into()),
                to: "+15550001".into(),
                body: "hello".into(),
                conversation_id: None,
                cycle: Some("2026-01-01".into()),
            }),
            IdempotencyKey::send(&ClientId("c-1".into()), "2026-01-01"),
            3,
            Utc::now(),
        )
    }

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn second_success_is_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        let task = task();
        let ok = JobRun::for_task(&task, JobOutcome::Success, None, at("2026-01-01T00:00:01Z"));
        record_job_run(&db, &ok).await.unwrap();

        let again = JobRun::for_task(&task, JobOutcome::Success, None, at("2026-01-01T00:00:02Z"));
        let err = record_job_run(&db, &again).await.unwrap_err();
        assert!(matches!(err, WaflowError::DuplicateSubmission { .. }));
        assert!(has_success(&db, &task.idempotency_key).await.unwrap());
    }

    #[tokio::test]
    async fn history_is_ordered_and_keeps_failures() {
        let db = Database::open_in_memory().await.unwrap();
        let mut task = task();
        let retry = JobRun::for_task(
            &task,
            JobOutcome::Retrying,
            Some("timeout".into()),
            at("2026-01-01T00:00:01Z"),
        );
        record_job_run(&db, &retry).await.unwrap();
        task.attempts = 1;
        let ok = JobRun::for_task(&task, JobOutcome::Success, None, at("2026-01-01T00:00:05Z"));
        record_job_run(&db, &ok).await.unwrap();

        let runs = job_runs_for_key(&db, &task.idempotency_key).await.unwrap();
        let outcomes: Vec<_> = runs.iter().map(|r| (r.attempt, r.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![(1, JobOutcome::Retrying), (2, JobOutcome::Success)]
        );
        assert_eq!(runs[0].error.as_deref(), Some("timeout"));
    }
}
