// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook processing: verify, normalize, append, and request summaries.

use std::sync::Arc;

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use waflow_config::model::IngressConfig;
use waflow_core::{
    AppendOutcome, Clock, Direction, InboundEvent, NewMessage, NormalizedMessage, StateStore,
    Verification, WaflowError,
};
use waflow_dispatch::TaskDispatcher;

use crate::crypto::{open_envelope, parse_key, verify_signature};
use crate::payload::parse_webhook;

/// Secrets and thresholds for webhook processing.
#[derive(Debug, Clone)]
pub struct IngressSettings {
    pub signing_secret: SecretString,
    pub encryption_key: Option<[u8; 32]>,
    /// Unsummarized message count that triggers a summarization request.
    pub summarize_every: i64,
}

impl IngressSettings {
    /// Fails if the signing secret is missing or the encryption key is malformed.
    pub fn from_config(config: &IngressConfig) -> Result<Self, WaflowError> {
        let signing_secret = config
            .signing_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| WaflowError::Config("ingress.signing_secret is not set".into()))?;
        let encryption_key = config
            .encryption_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(parse_key)
            .transpose()?;
        Ok(Self {
            signing_secret: SecretString::from(signing_secret.to_string()),
            encryption_key,
            summarize_every: config.summarize_every.max(1),
        })
    }
}

/// What one accepted webhook did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub event_id: String,
    pub appended: usize,
    /// Messages already stored by an earlier delivery of the same webhook.
    pub duplicates: usize,
    /// Messages dropped for lack of a usable sender.
    pub skipped: usize,
    /// Summarize tasks submitted (new or already queued).
    pub summaries_requested: usize,
}

/// Turns verified webhooks into conversation state and summarize tasks.
pub struct IngressService {
    store: Arc<dyn StateStore>,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Clock>,
    settings: IngressSettings,
    /// One lock per sender. A sender has one open conversation, so this
    /// serializes appends per conversation.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngressService {
    pub fn new(
        store: Arc<dyn StateStore>,
        dispatcher: TaskDispatcher,
        clock: Arc<dyn Clock>,
        settings: IngressSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            settings,
            locks: DashMap::new(),
        }
    }

    /// Processes one raw webhook body.
    ///
    /// Nothing is written unless the signature verifies. Returns once every
    /// message is durably appended and any summarize task is confirmed by the
    /// broker; a [`WaflowError::BrokerUnavailable`] tells the caller to have
    /// the gateway redeliver.
    pub async fn ingest(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<IngestReport, WaflowError> {
        let secret = self.settings.signing_secret.expose_secret().as_bytes();
        if verify_signature(secret, raw, signature) == Verification::Failed {
            return Err(WaflowError::Authentication(
                "webhook signature did not verify".into(),
            ));
        }

        let plaintext = match &self.settings.encryption_key {
            Some(key) => open_envelope(key, raw)?,
            None => raw.to_vec(),
        };
        let received_at = self.clock.now();
        let parsed = parse_webhook(&plaintext, received_at)?;

        let event = InboundEvent {
            id: uuid::Uuid::new_v4().to_string(),
            raw_payload: raw.to_vec(),
            received_at,
            verification: Verification::Verified,
            messages: parsed.messages,
        };
        self.store.archive_inbound_event(&event).await?;

        let mut report = IngestReport {
            event_id: event.id.clone(),
            skipped: parsed.skipped,
            ..IngestReport::default()
        };
        for message in &event.messages {
            self.ingest_message(message, &mut report).await?;
        }

        info!(
            event_id = report.event_id.as_str(),
            appended = report.appended,
            duplicates = report.duplicates,
            skipped = report.skipped,
            summaries = report.summaries_requested,
            "webhook ingested"
        );
        Ok(report)
    }

    async fn ingest_message(
        &self,
        message: &NormalizedMessage,
        report: &mut IngestReport,
    ) -> Result<(), WaflowError> {
        let lock = self
            .locks
            .entry(message.sender.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.append_and_maybe_summarize(message, report).await
        };
        drop(lock);
        // Drop the entry once nobody else holds or waits on it.
        self.locks
            .remove_if(&message.sender, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn append_and_maybe_summarize(
        &self,
        message: &NormalizedMessage,
        report: &mut IngestReport,
    ) -> Result<(), WaflowError> {
        let client = self.store.ensure_client(&message.sender).await?;
        let conversation = self
            .store
            .open_conversation(&client.id, self.clock.now())
            .await?;

        let outcome = self
            .store
            .append_message(
                &conversation.id,
                &NewMessage {
                    message_id: message.message_id.clone(),
                    direction: Direction::Inbound,
                    msg_type: message.msg_type.clone(),
                    body: message.body.clone(),
                    sent_at: message.timestamp,
                },
            )
            .await?;
        match outcome {
            AppendOutcome::Appended { seq } => {
                report.appended += 1;
                debug!(conversation_id = %conversation.id, seq, "inbound message appended");
            }
            AppendOutcome::AlreadyPresent => {
                report.duplicates += 1;
                debug!(
                    conversation_id = %conversation.id,
                    message_id = message.message_id.as_str(),
                    "inbound message already stored"
                );
            }
        }

        let Some(current) = self.store.conversation(&conversation.id).await? else {
            return Err(WaflowError::NotFound(format!(
                "conversation {} vanished during ingest",
                conversation.id
            )));
        };
        if current.unsummarized() < self.settings.summarize_every {
            return Ok(());
        }

        let ticket = self.store.request_summary(&current.id).await?;
        // A claimed cycle has a running task. An unclaimed one is resubmitted
        // under its cycle key in case an earlier submit never landed.
        if !ticket.pending {
            return Ok(());
        }
        match self
            .dispatcher
            .submit_summarize(&current.id, &message.message_id, ticket.cycle)
            .await
        {
            Ok(_) => {
                report.summaries_requested += 1;
                Ok(())
            }
            Err(e) => {
                warn!(
                    conversation_id = %current.id,
                    cycle = ticket.cycle,
                    error = %e,
                    "summarize submission failed"
                );
                Err(e)
            }
        }
    }
}
