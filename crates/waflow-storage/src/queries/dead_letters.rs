// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter inspection helpers used by the operator CLI.

use rusqlite::params;
use waflow_core::{TaskId, WaflowError};

use crate::database::{Database, map_tr_err};

/// Number of dead letters that have not been replayed.
pub async fn count_pending(db: &Database) -> Result<u64, WaflowError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM dead_letters WHERE replayed_at IS NULL",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// How many times `task_id` has been dead-lettered.
pub async fn times_dead_lettered(db: &Database, task_id: &TaskId) -> Result<u64, WaflowError> {
    let id = task_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM dead_letters WHERE task_id = ?1",
                params![id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
