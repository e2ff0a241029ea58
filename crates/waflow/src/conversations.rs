// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waflow conversations` and `waflow send` command implementations.

use std::sync::Arc;

use waflow_config::WaflowConfig;
use waflow_core::{Clock, ConversationId, StateStore, SystemClock, WaflowError, normalize_msisdn};
use waflow_dispatch::{DispatchSettings, Submission, TaskDispatcher};
use waflow_storage::{Database, SqliteBroker, SqliteStore};

pub async fn run_close(config: &WaflowConfig, conversation_id: &str) -> Result<(), WaflowError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let store = SqliteStore::new(db.clone(), Arc::new(SystemClock));
    let output = close(&store, conversation_id).await;
    db.close().await?;
    println!("{}", output?);
    Ok(())
}

pub async fn run_send(config: &WaflowConfig, contact: &str, text: &str) -> Result<(), WaflowError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = SqliteStore::new(db.clone(), clock.clone());
    let dispatcher = TaskDispatcher::new(
        Arc::new(SqliteBroker::new(db.clone(), clock.clone())),
        clock,
        DispatchSettings::from_config(config),
    );
    let output = send(&store, &dispatcher, contact, text).await;
    db.close().await?;
    println!("{}", output?);
    Ok(())
}

/// Closes one conversation. The client's next message starts a fresh one.
pub async fn close(store: &dyn StateStore, conversation_id: &str) -> Result<String, WaflowError> {
    let id = ConversationId(conversation_id.to_string());
    if store.conversation(&id).await?.is_none() {
        return Err(WaflowError::NotFound(format!("conversation `{id}`")));
    }
    if store.close_conversation(&id).await? {
        Ok(format!("closed conversation {id}"))
    } else {
        Ok(format!("conversation {id} was already closed"))
    }
}

/// Queues an operator message for `contact` outside any outreach cycle.
///
/// Unknown contacts are registered first, not opted in to outreach.
pub async fn send(
    store: &dyn StateStore,
    dispatcher: &TaskDispatcher,
    contact: &str,
    text: &str,
) -> Result<String, WaflowError> {
    let contact = normalize_msisdn(contact).ok_or_else(|| {
        WaflowError::MalformedPayload(format!("`{contact}` is not a phone number"))
    })?;
    if text.trim().is_empty() {
        return Err(WaflowError::MalformedPayload("message text is empty".into()));
    }
    let client = store.ensure_client(&contact).await?;
    match dispatcher.submit_direct_message(&client, text, None).await? {
        Submission::Accepted(task_id) => Ok(format!("queued {task_id} for {contact}")),
        Submission::Duplicate => Ok(format!("message for {contact} was already queued")),
    }
}
