// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Archive of verified webhook deliveries.

use rusqlite::params;
use waflow_core::{InboundEvent, WaflowError};

use crate::database::{Database, fmt_ts, map_tr_err, to_json};

/// Archive a verified event with its normalized messages. Re-archiving is a no-op.
pub async fn archive_inbound_event(db: &Database, event: &InboundEvent) -> Result<(), WaflowError> {
    let id = event.id.clone();
    let raw = event.raw_payload.clone();
    let received_at = fmt_ts(event.received_at);
    let verification = event.verification.to_string();
    let messages = to_json(&event.messages)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO inbound_events
                     (id, raw_payload, received_at, verification, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, raw, received_at, verification, messages],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of archived events.
pub async fn count_inbound_events(db: &Database) -> Result<u64, WaflowError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM inbound_events", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use waflow_core::{NormalizedMessage, Verification};

    #[tokio::test]
    async fn archive_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let event = InboundEvent {
            id: "evt-1".into(),
            raw_payload: br#"{"messages":[]}"#.to_vec(),
            received_at: Utc::now(),
            verification: Verification::Verified,
            messages: vec![NormalizedMessage {
                message_id: "wamid.1".into(),
                sender: "+15550001".into(),
                msg_type: "text".into(),
                body: "hi".into(),
                timestamp: Utc::now(),
            }],
        };
        archive_inbound_event(&db, &event).await.unwrap();
        archive_inbound_event(&db, &event).await.unwrap();
        assert_eq!(count_inbound_events(&db).await.unwrap(), 1);
    }
}
