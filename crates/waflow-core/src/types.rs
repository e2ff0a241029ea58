// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Waflow pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::keys::IdempotencyKey;

/// Unique identifier for a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Unique identifier for a task (distinct from its idempotency key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generates a fresh random task id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

macro_rules! impl_display_for_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

impl_display_for_id!(ClientId, ConversationId, TaskId);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter plugged into the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Broker,
    Store,
    Gateway,
    Summarizer,
    Observability,
}

// --- Tasks ---

/// The kind of work a task represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    SendMessage,
    Summarize,
    OutreachBatch,
}

impl TaskKind {
    /// The durable queue this kind of task is routed to.
    pub fn queue(self) -> Queue {
        match self {
            TaskKind::SendMessage => Queue::SendMessage,
            TaskKind::Summarize => Queue::Summarize,
            TaskKind::OutreachBatch => Queue::OutreachBatch,
        }
    }
}

/// Durable work queues. One per task kind; dead letters are kept separately.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    SendMessage,
    Summarize,
    OutreachBatch,
}

impl Queue {
    /// All work queues, in a stable order.
    pub const ALL: [Queue; 3] = [Queue::SendMessage, Queue::Summarize, Queue::OutreachBatch];

    /// Queue name as stored by the broker and used as the routing key.
    pub fn name(self) -> &'static str {
        match self {
            Queue::SendMessage => "send_message",
            Queue::Summarize => "summarize",
            Queue::OutreachBatch => "outreach_batch",
        }
    }
}

/// Deliver one text message to one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub client_id: ClientId,
    /// Destination MSISDN (normalized, `+` prefixed).
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    /// Outreach cycle this message belongs to, if scheduled.
    #[serde(default)]
    pub cycle: Option<String>,
}

/// Summarize a conversation through a given message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizePayload {
    pub conversation_id: ConversationId,
    /// The newest message id included in this request.
    pub through_message_id: String,
    /// Summarization cycle the request opened (or joined).
    pub cycle: i64,
}

/// Fan out outreach messages to a set of clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachBatchPayload {
    pub cycle: String,
    pub client_ids: Vec<ClientId>,
}

/// Kind-specific task payload.
///
/// Handlers match on this exhaustively; the task kind is always derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum TaskPayload {
    SendMessage(SendMessagePayload),
    Summarize(SummarizePayload),
    OutreachBatch(OutreachBatchPayload),
}

impl TaskPayload {
    /// Returns the kind of this payload.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::SendMessage(_) => TaskKind::SendMessage,
            TaskPayload::Summarize(_) => TaskKind::Summarize,
            TaskPayload::OutreachBatch(_) => TaskKind::OutreachBatch,
        }
    }
}

/// A unit of work owned by the broker once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub idempotency_key: IdempotencyKey,
    pub payload: TaskPayload,
    pub routing_key: String,
    /// Failed executions so far. The current execution number is `attempts + 1`.
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub next_run_at: DateTime<Utc>,
}

impl Task {
    /// Creates a fresh task routed to its kind's queue, eligible immediately.
    pub fn new(
        payload: TaskPayload,
        idempotency_key: IdempotencyKey,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let routing_key = payload.kind().queue().name().to_string();
        Self {
            id: TaskId::generate(),
            idempotency_key,
            payload,
            routing_key,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at: now,
            next_run_at: now,
        }
    }

    /// Returns the kind of this task.
    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    /// The execution number of the current run (1-based).
    pub fn execution(&self) -> u32 {
        self.attempts + 1
    }

    /// True if the current execution is the last one allowed.
    pub fn is_final_attempt(&self) -> bool {
        self.execution() >= self.max_attempts
    }
}

/// Lifecycle of a task inside the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Enqueued,
    InFlight,
    Succeeded,
    DeadLettered,
}

/// Result of a publish the broker has confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The entry was durably written.
    Accepted,
    /// An entry with the same idempotency key already exists; nothing was written.
    Duplicate,
}

/// Per-queue entry counts, by state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub enqueued: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub dead_lettered: u64,
}

/// A task moved out of circulation after exhausting retries or failing permanently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task: Task,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
    pub replayed_at: Option<DateTime<Utc>>,
}

// --- Clients and conversations ---

/// A contact eligible (or not) for periodic outreach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// Normalized MSISDN (`+` prefixed).
    pub contact: String,
    pub display_name: Option<String>,
    pub opted_in: bool,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Eligibility for outreach at `now` under the given cooldown window.
    pub fn is_eligible(&self, now: DateTime<Utc>, cooldown: chrono::Duration) -> bool {
        self.opted_in
            && self
                .last_contacted_at
                .is_none_or(|last| last <= now - cooldown)
    }
}

/// Whether a conversation is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Closed,
}

/// Summarization status of a conversation.
///
/// Within one cycle the status only moves forward:
/// `Pending -> InProgress -> {Done, Failed}`. Returning to `Pending` requires
/// an explicit new request, which opens a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl SummaryStatus {
    /// True for statuses that end a cycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, SummaryStatus::Done | SummaryStatus::Failed)
    }

    /// True if `self -> next` is allowed within a single cycle.
    pub fn can_advance_to(self, next: SummaryStatus) -> bool {
        matches!(
            (self, next),
            (SummaryStatus::Pending, SummaryStatus::InProgress)
                | (SummaryStatus::InProgress, SummaryStatus::Done)
                | (SummaryStatus::InProgress, SummaryStatus::Failed)
                | (SummaryStatus::Pending, SummaryStatus::Failed)
        )
    }
}

/// A conversation between the business and one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub client_id: ClientId,
    pub status: ConversationStatus,
    /// `None` until the first summarization request.
    pub summary_status: Option<SummaryStatus>,
    pub summary: Option<String>,
    /// Incremented by every explicit summarization request that opens a cycle.
    pub summary_cycle: i64,
    /// Number of messages covered by the latest summary.
    pub summarized_count: i64,
    pub message_count: i64,
    pub started_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Messages appended since the latest summary.
    pub fn unsummarized(&self) -> i64 {
        self.message_count - self.summarized_count
    }
}

/// Direction of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One message in a conversation's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Gateway message id (unique within the conversation).
    pub message_id: String,
    pub conversation_id: ConversationId,
    /// Position in the conversation, assigned by the store on append.
    pub seq: i64,
    pub direction: Direction,
    pub msg_type: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Outcome of an append to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was stored at the given sequence number.
    Appended { seq: i64 },
    /// A message with the same id was already present.
    AlreadyPresent,
}

/// A message about to be appended; the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub message_id: String,
    pub direction: Direction,
    pub msg_type: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Result of an explicit summarization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryTicket {
    /// The cycle the request belongs to.
    pub cycle: i64,
    /// True if the request opened a new cycle, false if it joined a running one.
    pub opened: bool,
    /// True while no worker has claimed the cycle yet.
    pub pending: bool,
}

/// Result of a worker trying to start (or resume) a summarization cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryClaim {
    /// The cycle is now `InProgress` and owned by the caller.
    Claimed,
    /// The cycle already ended (`Done` or `Failed`).
    Finished(SummaryStatus),
    /// A newer cycle superseded the requested one.
    Superseded { current: i64 },
}

/// Input handed to the summarization provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizeInput {
    pub conversation_id: ConversationId,
    /// Ordered prefix of the conversation.
    pub messages: Vec<ConversationMessage>,
    pub previous_summary: Option<String>,
}

impl SummarizeInput {
    /// Total characters of message bodies sent to the provider.
    pub fn content_chars(&self) -> usize {
        self.messages.iter().map(|m| m.body.chars().count()).sum()
    }
}

// --- Audit ---

/// Outcome recorded for one task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failure,
    Retrying,
}

/// Append-only audit record of a task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub task_id: TaskId,
    pub idempotency_key: IdempotencyKey,
    pub kind: TaskKind,
    /// 1-based execution number.
    pub attempt: u32,
    pub outcome: JobOutcome,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl JobRun {
    /// Builds a job run for the current execution of `task`.
    pub fn for_task(
        task: &Task,
        outcome: JobOutcome,
        error: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            idempotency_key: task.idempotency_key.clone(),
            kind: task.kind(),
            attempt: task.execution(),
            outcome,
            error,
            completed_at,
        }
    }
}

// --- Ingress ---

/// Result of the authenticity check on a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Verified,
    Failed,
}

/// A message extracted from a verified webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub message_id: String,
    /// Sender MSISDN (normalized, `+` prefixed).
    pub sender: String,
    pub msg_type: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// A webhook delivery as received by ingress. Immutable once verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub id: String,
    pub raw_payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
    pub verification: Verification,
    pub messages: Vec<NormalizedMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn payload_serializes_as_tagged_variant() {
        let payload = TaskPayload::Summarize(SummarizePayload {
            conversation_id: ConversationId("conv-1".into()),
            through_message_id: "wamid.1".into(),
            cycle: 2,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "summarize");
        assert_eq!(json["payload"]["conversation_id"], "conv-1");

        let back: TaskPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), TaskKind::Summarize);
    }

    #[test]
    fn task_routes_to_kind_queue() {
        let task = Task::new(
            TaskPayload::OutreachBatch(OutreachBatchPayload {
                cycle: "2026-01-01".into(),
                client_ids: vec![ClientId("c1".into())],
            }),
            IdempotencyKey::outreach(&ClientId("c1".into()), "2026-01-01"),
            3,
            at("2026-01-01T00:00:00Z"),
        );
        assert_eq!(task.routing_key, "outreach_batch");
        assert_eq!(task.execution(), 1);
        assert!(!task.is_final_attempt());
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let task = Task::new(
            TaskPayload::OutreachBatch(OutreachBatchPayload {
                cycle: "c".into(),
                client_ids: vec![],
            }),
            IdempotencyKey::outreach(&ClientId("c1".into()), "c"),
            0,
            at("2026-01-01T00:00:00Z"),
        );
        assert_eq!(task.max_attempts, 1);
        assert!(task.is_final_attempt());
    }

    #[test]
    fn client_eligibility_respects_cooldown_and_opt_in() {
        let now = at("2026-03-11T09:00:00Z");
        let mut client = Client {
            id: ClientId("c".into()),
            contact: "+15550001".into(),
            display_name: None,
            opted_in: true,
            last_contacted_at: Some(at("2026-03-01T09:00:00Z")),
            created_at: at("2026-01-01T00:00:00Z"),
        };
        // Contacted 10 days ago, cooldown 7 days.
        assert!(client.is_eligible(now, chrono::Duration::days(7)));
        assert!(!client.is_eligible(now, chrono::Duration::days(14)));

        client.last_contacted_at = None;
        assert!(client.is_eligible(now, chrono::Duration::days(7)));

        client.opted_in = false;
        assert!(!client.is_eligible(now, chrono::Duration::days(7)));
    }

    #[test]
    fn summary_status_never_regresses_within_cycle() {
        use SummaryStatus::*;
        assert!(Pending.can_advance_to(InProgress));
        assert!(InProgress.can_advance_to(Done));
        assert!(InProgress.can_advance_to(Failed));
        assert!(!Done.can_advance_to(Pending));
        assert!(!Failed.can_advance_to(Pending));
        assert!(!Done.can_advance_to(InProgress));
        assert!(!InProgress.can_advance_to(Pending));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn enum_string_forms_are_snake_case() {
        use std::str::FromStr;
        assert_eq!(TaskKind::OutreachBatch.to_string(), "outreach_batch");
        assert_eq!(
            TaskKind::from_str("send_message").unwrap(),
            TaskKind::SendMessage
        );
        assert_eq!(SummaryStatus::InProgress.to_string(), "in_progress");
        assert_eq!(Queue::Summarize.name(), Queue::Summarize.to_string());
    }
}
