// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task handlers, one per task kind.
//!
//! Handlers return `Ok(())` on success and classify failures through
//! [`WaflowError::is_transient`]; the runner turns that into ack, retry, or
//! dead-letter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use waflow_core::{
    Client, Clock, ConversationId, Direction, MessageGateway, NewMessage, OutreachBatchPayload,
    SendMessagePayload, StateStore, SummarizeInput, SummarizePayload, Summarizer, SummaryClaim,
    Task, TaskPayload, WaflowError,
};
use waflow_dispatch::{Submission, TaskDispatcher};

/// Handler parameters taken from configuration.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Outreach text; `{name}` is replaced with the client's display name.
    pub outreach_template: String,
    /// Largest conversation (in characters) handed to the summarizer.
    pub max_input_chars: usize,
}

/// Executes tasks against the store and the external providers.
pub struct Handlers {
    store: Arc<dyn StateStore>,
    gateway: Arc<dyn MessageGateway>,
    summarizer: Arc<dyn Summarizer>,
    dispatcher: TaskDispatcher,
    clock: Arc<dyn Clock>,
    settings: HandlerSettings,
}

impl Handlers {
    pub fn new(
        store: Arc<dyn StateStore>,
        gateway: Arc<dyn MessageGateway>,
        summarizer: Arc<dyn Summarizer>,
        dispatcher: TaskDispatcher,
        clock: Arc<dyn Clock>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            summarizer,
            dispatcher,
            clock,
            settings,
        }
    }

    /// Runs the handler for `task`'s kind.
    pub async fn handle(&self, task: &Task) -> Result<(), WaflowError> {
        match &task.payload {
            TaskPayload::SendMessage(p) => self.send_message(p).await,
            TaskPayload::Summarize(p) => self.summarize(p).await,
            TaskPayload::OutreachBatch(p) => self.outreach_batch(p).await,
        }
    }

    /// Called once `task` is about to be dead-lettered.
    pub async fn on_dead_letter(&self, task: &Task) -> Result<(), WaflowError> {
        if let TaskPayload::Summarize(p) = &task.payload
            && self.store.fail_summary(&p.conversation_id, p.cycle).await?
        {
            info!(
                conversation_id = %p.conversation_id,
                cycle = p.cycle,
                "summarization marked failed"
            );
        }
        Ok(())
    }

    async fn send_message(&self, p: &SendMessagePayload) -> Result<(), WaflowError> {
        let client = self
            .store
            .client(&p.client_id)
            .await?
            .ok_or_else(|| WaflowError::permanent(format!("unknown client `{}`", p.client_id)))?;

        let message_id = self.gateway.send_text(&p.to, &p.body).await?;
        let now = self.clock.now();

        // The message is out. A retry from here on would send it twice.
        match self.record_sent(&client, p, &message_id, now).await {
            Ok(conversation_id) => debug!(
                client_id = %client.id,
                conversation_id = %conversation_id,
                message_id = message_id.as_str(),
                "message delivered"
            ),
            Err(e) => {
                metrics::counter!("waflow_delivery_bookkeeping_failures_total").increment(1);
                warn!(
                    client_id = %client.id,
                    message_id = message_id.as_str(),
                    error = %e,
                    "message delivered but not recorded"
                );
            }
        }
        Ok(())
    }

    /// Stores the outbound message and moves the client's last contact.
    async fn record_sent(
        &self,
        client: &Client,
        p: &SendMessagePayload,
        message_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationId, WaflowError> {
        let conversation_id = match &p.conversation_id {
            Some(id) => id.clone(),
            None => self.store.open_conversation(&client.id, now).await?.id,
        };
        self.store
            .append_message(
                &conversation_id,
                &NewMessage {
                    message_id: message_id.to_string(),
                    direction: Direction::Outbound,
                    msg_type: "text".to_string(),
                    body: p.body.clone(),
                    sent_at: now,
                },
            )
            .await?;
        self.store.record_delivery(&client.id, now).await?;
        Ok(conversation_id)
    }

    async fn outreach_batch(&self, p: &OutreachBatchPayload) -> Result<(), WaflowError> {
        let mut submitted = 0usize;
        let mut skipped = 0usize;
        for client_id in &p.client_ids {
            let Some(client) = self.store.client(client_id).await? else {
                warn!(client_id = %client_id, cycle = p.cycle.as_str(), "outreach skipped: unknown client");
                skipped += 1;
                continue;
            };
            if !client.opted_in {
                debug!(client_id = %client_id, "outreach skipped: client opted out");
                skipped += 1;
                continue;
            }
            let body = render_template(&self.settings.outreach_template, &client);
            match self
                .dispatcher
                .submit_send_message(&client, &body, &p.cycle)
                .await?
            {
                Submission::Accepted(_) => submitted += 1,
                Submission::Duplicate => {}
            }
        }
        info!(
            cycle = p.cycle.as_str(),
            clients = p.client_ids.len(),
            submitted,
            skipped,
            "outreach batch expanded"
        );
        Ok(())
    }

    async fn summarize(&self, p: &SummarizePayload) -> Result<(), WaflowError> {
        match self.store.begin_summary(&p.conversation_id, p.cycle).await? {
            SummaryClaim::Claimed => {}
            SummaryClaim::Finished(status) => {
                debug!(
                    conversation_id = %p.conversation_id,
                    cycle = p.cycle,
                    %status,
                    "summarization cycle already finished"
                );
                return Ok(());
            }
            SummaryClaim::Superseded { current } => {
                info!(
                    conversation_id = %p.conversation_id,
                    cycle = p.cycle,
                    current,
                    "summarization request superseded by a newer cycle"
                );
                return Ok(());
            }
        }

        let conversation = self
            .store
            .conversation(&p.conversation_id)
            .await?
            .ok_or_else(|| {
                WaflowError::permanent(format!("unknown conversation `{}`", p.conversation_id))
            })?;
        let messages = self.store.messages(&p.conversation_id).await?;
        let input = SummarizeInput {
            conversation_id: p.conversation_id.clone(),
            messages,
            previous_summary: conversation.summary,
        };

        let chars = input.content_chars();
        if chars > self.settings.max_input_chars {
            return Err(WaflowError::permanent(format!(
                "conversation too large to summarize: {chars} chars (limit {})",
                self.settings.max_input_chars
            )));
        }

        let summary = self.summarizer.summarize(&input).await?;
        let covered = i64::try_from(input.messages.len()).unwrap_or(i64::MAX);
        if !self
            .store
            .complete_summary(&p.conversation_id, p.cycle, &summary, covered)
            .await?
        {
            warn!(
                conversation_id = %p.conversation_id,
                cycle = p.cycle,
                "summary discarded: cycle no longer in progress"
            );
        }
        Ok(())
    }
}

/// Renders the outreach template for `client`.
pub fn render_template(template: &str, client: &Client) -> String {
    let name = client
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("there");
    template.replace("{name}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waflow_core::ClientId;

    fn client(name: Option<&str>) -> Client {
        Client {
            id: ClientId("c".into()),
            contact: "+15550001".into(),
            display_name: name.map(str::to_string),
            opted_in: true,
            last_contacted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn template_uses_display_name() {
        assert_eq!(render_template("Hi {name}!", &client(Some("Ana"))), "Hi Ana!");
    }

    #[test]
    fn template_falls_back_without_name() {
        assert_eq!(render_template("Hi {name}!", &client(None)), "Hi there!");
        assert_eq!(render_template("Hi {name}!", &client(Some("  "))), "Hi there!");
    }
}
