// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client records and the outreach eligibility window.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use waflow_core::{Client, ClientId, WaflowError};

use crate::database::{Database, fmt_ts, map_tr_err, parse_opt_ts, parse_ts};

const CLIENT_COLUMNS: &str =
    "id, contact, display_name, opted_in, last_contacted_at, created_at";

pub(crate) fn row_to_client(row: &rusqlite::Row<'_>) -> Result<Client, rusqlite::Error> {
    let created_at: String = row.get(5)?;
    Ok(Client {
        id: ClientId(row.get(0)?),
        contact: row.get(1)?,
        display_name: row.get(2)?,
        opted_in: row.get(3)?,
        last_contacted_at: parse_opt_ts(4, row.get(4)?)?,
        created_at: parse_ts(5, &created_at)?,
    })
}

fn find_by_contact(
    conn: &rusqlite::Connection,
    contact: &str,
) -> Result<Option<Client>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE contact = ?1"),
        params![contact],
        row_to_client,
    )
    .optional()
}

/// Insert a client or update its name and opt-in flag.
pub async fn upsert_client(
    db: &Database,
    contact: &str,
    display_name: Option<&str>,
    opted_in: bool,
    now: DateTime<Utc>,
) -> Result<Client, WaflowError> {
    let contact = contact.to_string();
    let display_name = display_name.map(str::to_string);
    let id = uuid::Uuid::new_v4().to_string();
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO clients (id, contact, display_name, opted_in, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (contact) DO UPDATE SET
                     display_name = COALESCE(excluded.display_name, clients.display_name),
                     opted_in = excluded.opted_in",
                params![id, contact, display_name, opted_in, now],
            )?;
            find_by_contact(conn, &contact)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

/// Returns the client with `contact`, inserting it as not opted in if unknown.
pub async fn ensure_client(
    db: &Database,
    contact: &str,
    now: DateTime<Utc>,
) -> Result<Client, WaflowError> {
    let contact = contact.to_string();
    let id = uuid::Uuid::new_v4().to_string();
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO clients (id, contact, opted_in, created_at)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT (contact) DO NOTHING",
                params![id, contact, now],
            )?;
            find_by_contact(conn, &contact)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a client by id.
pub async fn get_client(db: &Database, id: &ClientId) -> Result<Option<Client>, WaflowError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"),
                params![id],
                row_to_client,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Opted-in clients whose last contact is absent or at or before `cutoff`.
///
/// Never-contacted clients come first, then the longest-waiting.
pub async fn eligible_clients(
    db: &Database,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Client>, WaflowError> {
    let cutoff = fmt_ts(cutoff);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLIENT_COLUMNS} FROM clients
                 WHERE opted_in = 1
                   AND (last_contacted_at IS NULL OR last_contacted_at <= ?1)
                 ORDER BY last_contacted_at IS NOT NULL, last_contacted_at, created_at, id"
            ))?;
            let rows = stmt.query_map(params![cutoff], row_to_client)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set of `last_contacted_at`: succeeds only if the client is still
/// eligible at `cutoff`. The check and the write are one statement inside a
/// transaction, so two racing schedulers cannot both claim the client.
pub async fn mark_contacted(
    db: &Database,
    id: &ClientId,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<bool, WaflowError> {
    let id = id.0.clone();
    let now = fmt_ts(now);
    let cutoff = fmt_ts(cutoff);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE clients SET last_contacted_at = ?2
                 WHERE id = ?1
                   AND opted_in = 1
                   AND (last_contacted_at IS NULL OR last_contacted_at <= ?3)",
                params![id, now, cutoff],
            )?;
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Records a confirmed delivery; `last_contacted_at` only moves forward.
pub async fn record_delivery(
    db: &Database,
    id: &ClientId,
    at: DateTime<Utc>,
) -> Result<(), WaflowError> {
    let id = id.0.clone();
    let at = fmt_ts(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE clients SET last_contacted_at = ?2
                 WHERE id = ?1 AND (last_contacted_at IS NULL OR last_contacted_at < ?2)",
                params![id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_contact() {
        let db = Database::open_in_memory().await.unwrap();
        let now = at("2026-01-01T00:00:00Z");
        let a = upsert_client(&db, "+15550001", Some("Ana"), false, now)
            .await
            .unwrap();
        let b = upsert_client(&db, "+15550001", None, true, now).await.unwrap();
        assert_eq!(a.id, b.id);
        assert!(b.opted_in);
        assert_eq!(b.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn ensure_client_creates_opted_out_and_is_stable() {
        let db = Database::open_in_memory().await.unwrap();
        let now = at("2026-01-01T00:00:00Z");
        let a = ensure_client(&db, "+15550002", now).await.unwrap();
        assert!(!a.opted_in);
        let b = ensure_client(&db, "+15550002", now).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn eligibility_window_and_cas() {
        let db = Database::open_in_memory().await.unwrap();
        let created = at("2026-01-01T00:00:00Z");
        let stale = upsert_client(&db, "+1000", None, true, created).await.unwrap();
        let fresh = upsert_client(&db, "+2000", None, true, created).await.unwrap();
        let never = upsert_client(&db, "+3000", None, true, created).await.unwrap();
        upsert_client(&db, "+4000", None, false, created).await.unwrap();

        record_delivery(&db, &stale.id, at("2026-03-01T09:00:00Z"))
            .await
            .unwrap();
        record_delivery(&db, &fresh.id, at("2026-03-09T09:00:00Z"))
            .await
            .unwrap();

        // now = 03-11, cooldown 7 days.
        let now = at("2026-03-11T09:00:00Z");
        let cutoff = now - chrono::Duration::days(7);
        let eligible = eligible_clients(&db, cutoff).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![never.id.clone(), stale.id.clone()]);

        assert!(mark_contacted(&db, &stale.id, now, cutoff).await.unwrap());
        // A second claim in the same window loses.
        assert!(!mark_contacted(&db, &stale.id, now, cutoff).await.unwrap());
        assert!(!mark_contacted(&db, &fresh.id, now, cutoff).await.unwrap());

        let stale = get_client(&db, &stale.id).await.unwrap().unwrap();
        assert_eq!(stale.last_contacted_at, Some(now));
    }

    #[tokio::test]
    async fn record_delivery_never_moves_backwards() {
        let db = Database::open_in_memory().await.unwrap();
        let c = upsert_client(&db, "+5000", None, true, at("2026-01-01T00:00:00Z"))
            .await
            .unwrap();
        record_delivery(&db, &c.id, at("2026-02-02T00:00:00Z"))
            .await
            .unwrap();
        record_delivery(&db, &c.id, at("2026-02-01T00:00:00Z"))
            .await
            .unwrap();
        let c = get_client(&db, &c.id).await.unwrap().unwrap();
        assert_eq!(c.last_contacted_at, Some(at("2026-02-02T00:00:00Z")));
    }
}
