// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversations, their append-only message history, and summarization cycles.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use waflow_core::{
    AppendOutcome, ClientId, Conversation, ConversationId, ConversationMessage, NewMessage,
    SummaryClaim, SummaryStatus, SummaryTicket, WaflowError,
};

use crate::database::{Database, fmt_ts, map_tr_err, parse_enum, parse_opt_ts, parse_ts};

const CONVERSATION_COLUMNS: &str = "id, client_id, status, summary_status, summary, summary_cycle, \
     summarized_count, message_count, started_at, last_message_at";

fn row_to_conversation(row: &rusqlite::Row<'_>) -> Result<Conversation, rusqlite::Error> {
    let status: String = row.get(2)?;
    let summary_status: Option<String> = row.get(3)?;
    let started_at: String = row.get(8)?;
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        client_id: ClientId(row.get(1)?),
        status: parse_enum(2, &status)?,
        summary_status: summary_status
            .map(|s| parse_enum(3, &s))
            .transpose()?,
        summary: row.get(4)?,
        summary_cycle: row.get(5)?,
        summarized_count: row.get(6)?,
        message_count: row.get(7)?,
        started_at: parse_ts(8, &started_at)?,
        last_message_at: parse_opt_ts(9, row.get(9)?)?,
    })
}

fn load(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<Conversation>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
        params![id],
        row_to_conversation,
    )
    .optional()
}

/// The client's open conversation, created if none exists.
pub async fn open_conversation(
    db: &Database,
    client: &ClientId,
    now: DateTime<Utc>,
) -> Result<Conversation, WaflowError> {
    let client = client.0.clone();
    let id = uuid::Uuid::new_v4().to_string();
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (id, client_id, status, started_at)
                 VALUES (?1, ?2, 'open', ?3)
                 ON CONFLICT (client_id) WHERE status = 'open' DO NOTHING",
                params![id, client, now],
            )?;
            let conversation = tx.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE client_id = ?1 AND status = 'open'"
                ),
                params![client],
                row_to_conversation,
            )?;
            tx.commit()?;
            Ok(conversation)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a conversation by id.
pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| load(conn, &id))
        .await
        .map_err(map_tr_err)
}

/// Close a conversation. The client's next message opens a new one.
pub async fn close_conversation(db: &Database, id: &ConversationId) -> Result<bool, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations SET status = 'closed' WHERE id = ?1 AND status = 'open'",
                params![id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Append a message at `max(seq) + 1`.
///
/// Runs in one transaction: the duplicate check, the sequence read, the insert,
/// and the counter update either all happen or none do.
pub async fn append_message(
    db: &Database,
    conversation: &ConversationId,
    message: &NewMessage,
) -> Result<AppendOutcome, WaflowError> {
    let conversation = conversation.0.clone();
    let message = message.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM conversation_messages
                                WHERE conversation_id = ?1 AND message_id = ?2)",
                params![conversation, message.message_id],
                |row| row.get(0),
            )?;
            if exists {
                tx.commit()?;
                return Ok(AppendOutcome::AlreadyPresent);
            }

            let seq: i64 = tx.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM conversation_messages
                 WHERE conversation_id = ?1",
                params![conversation],
                |row| row.get(0),
            )?;
            let sent_at = fmt_ts(message.sent_at);
            tx.execute(
                "INSERT INTO conversation_messages
                     (conversation_id, seq, message_id, direction, msg_type, body, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    conversation,
                    seq,
                    message.message_id,
                    message.direction.to_string(),
                    message.msg_type,
                    message.body,
                    sent_at,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET
                     message_count = message_count + 1,
                     last_message_at = MAX(COALESCE(last_message_at, ?2), ?2)
                 WHERE id = ?1",
                params![conversation, sent_at],
            )?;
            tx.commit()?;
            Ok(AppendOutcome::Appended { seq })
        })
        .await
        .map_err(map_tr_err)
}

/// All messages of a conversation in sequence order.
pub async fn list_messages(
    db: &Database,
    conversation: &ConversationId,
) -> Result<Vec<ConversationMessage>, WaflowError> {
    let conversation = conversation.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, conversation_id, seq, direction, msg_type, body, sent_at
                 FROM conversation_messages WHERE conversation_id = ?1
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![conversation], |row| {
                let direction: String = row.get(3)?;
                let sent_at: String = row.get(6)?;
                Ok(ConversationMessage {
                    message_id: row.get(0)?,
                    conversation_id: ConversationId(row.get(1)?),
                    seq: row.get(2)?,
                    direction: parse_enum(3, &direction)?,
                    msg_type: row.get(4)?,
                    body: row.get(5)?,
                    sent_at: parse_ts(6, &sent_at)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

fn current_summary(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
) -> Result<(Option<SummaryStatus>, i64), rusqlite::Error> {
    let (status, cycle): (Option<String>, i64) = tx.query_row(
        "SELECT summary_status, summary_cycle FROM conversations WHERE id = ?1",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let status = status.map(|s| parse_enum(0, &s)).transpose()?;
    Ok((status, cycle))
}

/// Explicit summarization request: opens a new cycle unless one is running.
pub async fn request_summary(
    db: &Database,
    id: &ConversationId,
) -> Result<SummaryTicket, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (status, cycle) = current_summary(&tx, &id)?;
            let ticket = match status {
                Some(status @ (SummaryStatus::Pending | SummaryStatus::InProgress)) => {
                    SummaryTicket {
                        cycle,
                        opened: false,
                        pending: status == SummaryStatus::Pending,
                    }
                }
                None | Some(SummaryStatus::Done | SummaryStatus::Failed) => {
                    tx.execute(
                        "UPDATE conversations
                         SET summary_status = 'pending', summary_cycle = summary_cycle + 1
                         WHERE id = ?1",
                        params![id],
                    )?;
                    SummaryTicket {
                        cycle: cycle + 1,
                        opened: true,
                        pending: true,
                    }
                }
            };
            tx.commit()?;
            Ok(ticket)
        })
        .await
        .map_err(map_tr_err)
}

/// Claim `cycle` for a summarization run.
pub async fn begin_summary(
    db: &Database,
    id: &ConversationId,
    cycle: i64,
) -> Result<SummaryClaim, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (status, current) = current_summary(&tx, &id)?;
            let claim = if current != cycle {
                SummaryClaim::Superseded { current }
            } else {
                match status {
                    Some(SummaryStatus::Pending) => {
                        tx.execute(
                            "UPDATE conversations SET summary_status = 'in_progress'
                             WHERE id = ?1",
                            params![id],
                        )?;
                        SummaryClaim::Claimed
                    }
                    Some(SummaryStatus::InProgress) => SummaryClaim::Claimed,
                    Some(done @ (SummaryStatus::Done | SummaryStatus::Failed)) => {
                        SummaryClaim::Finished(done)
                    }
                    // A cycle number without a status cannot be produced by request_summary.
                    None => SummaryClaim::Superseded { current },
                }
            };
            tx.commit()?;
            Ok(claim)
        })
        .await
        .map_err(map_tr_err)
}

/// Write the summary and flip `cycle` to done.
pub async fn complete_summary(
    db: &Database,
    id: &ConversationId,
    cycle: i64,
    summary: &str,
    covered_messages: i64,
) -> Result<bool, WaflowError> {
    let id = id.0.clone();
    let summary = summary.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations
                 SET summary_status = 'done', summary = ?3, summarized_count = ?4
                 WHERE id = ?1 AND summary_cycle = ?2 AND summary_status = 'in_progress'",
                params![id, cycle, summary, covered_messages],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Flip `cycle` to failed, keeping the previous summary text.
pub async fn fail_summary(
    db: &Database,
    id: &ConversationId,
    cycle: i64,
) -> Result<bool, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE conversations SET summary_status = 'failed'
                 WHERE id = ?1 AND summary_cycle = ?2
                   AND summary_status IN ('pending', 'in_progress')",
                params![id, cycle],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}
