// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Waflow.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Waflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaflowConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite state store and queue settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Broker consumption and publish settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Task retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool sizing and timeouts.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Periodic outreach scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Inbound webhook server.
    #[serde(default)]
    pub ingress: IngressConfig,

    /// Outbound WhatsApp gateway.
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Summarization provider.
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Prometheus metrics export.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "waflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for concurrent reads.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("waflow").join("waflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("waflow.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Delay between fetches when a queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a consumer holds a delivery before it is redelivered.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Deadline for one publish confirm.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    /// Extra publish attempts after an unavailable broker, before giving up.
    #[serde(default = "default_publish_retries")]
    pub publish_retries: u32,

    /// First reconnect delay after a connection loss.
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Upper bound on the reconnect delay.
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_lease_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
            publish_retries: default_publish_retries(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lease_secs() -> u64 {
    300
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_publish_retries() -> u32 {
    3
}

fn default_reconnect_base_ms() -> u64 {
    500
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

/// Task retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total executions allowed per task, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on the retry delay before jitter.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Jitter added on top of the delay, as a fraction of it (0.0 to 1.0).
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_cap_ms() -> u64 {
    300_000
}

fn default_jitter_ratio() -> f64 {
    0.2
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Workers consuming `send_message` and `outreach_batch`.
    #[serde(default = "default_outreach_workers")]
    pub outreach_workers: usize,

    /// Workers consuming `summarize`.
    #[serde(default = "default_summarize_workers")]
    pub summarize_workers: usize,

    /// Deadline for a single handler execution.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// How long shutdown waits for in-flight handlers.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            outreach_workers: default_outreach_workers(),
            summarize_workers: default_summarize_workers(),
            handler_timeout_secs: default_handler_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_outreach_workers() -> usize {
    4
}

fn default_summarize_workers() -> usize {
    2
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Periodic outreach scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Run the scheduler in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between ticks.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// A client is not contacted again within this many hours.
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u64,

    /// Lower bound of the random delay before each submission in a tick.
    #[serde(default)]
    pub jitter_min_ms: u64,

    /// Upper bound of the random delay before each submission in a tick.
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Clients per OutreachBatch task. 1 submits one task per client.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Outreach message. `{name}` is replaced by the client's display name.
    #[serde(default = "default_outreach_template")]
    pub outreach_template: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: default_tick_interval_secs(),
            cooldown_hours: default_cooldown_hours(),
            jitter_min_ms: 0,
            jitter_max_ms: default_jitter_max_ms(),
            batch_size: default_batch_size(),
            outreach_template: default_outreach_template(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours.min(MAX_COOLDOWN_HOURS) as i64)
    }
}

/// Upper bound accepted for `scheduler.cooldown_hours` (ten years).
pub const MAX_COOLDOWN_HOURS: u64 = 24 * 365 * 10;

fn default_true() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_cooldown_hours() -> u64 {
    24 * 7
}

fn default_jitter_max_ms() -> u64 {
    250
}

fn default_batch_size() -> usize {
    1
}

fn default_outreach_template() -> String {
    "Hi {name}, just checking in. Reply here if there is anything we can help with.".to_string()
}

/// Inbound webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngressConfig {
    /// Address to bind the HTTP server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port for the HTTP server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret for the `X-Waflow-Signature` HMAC. Required to serve webhooks.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// 64 hex chars (AES-256-GCM). When set, bodies arrive as sealed envelopes.
    #[serde(default)]
    pub encryption_key: Option<String>,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Request summarization once this many messages are unsummarized.
    #[serde(default = "default_summarize_every")]
    pub summarize_every: i64,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            signing_secret: None,
            encryption_key: None,
            max_body_bytes: default_max_body_bytes(),
            summarize_every: default_summarize_every(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_summarize_every() -> i64 {
    4
}

/// Outbound WhatsApp gateway configuration (360dialog-compatible API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Gateway API key, sent as `D360-API-KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Gateway base URL.
    #[serde(default = "default_whatsapp_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_whatsapp_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_whatsapp_base_url(),
            timeout_secs: default_whatsapp_timeout_secs(),
        }
    }
}

fn default_whatsapp_base_url() -> String {
    "https://waba-sandbox.360dialog.io".to_string()
}

fn default_whatsapp_timeout_secs() -> u64 {
    15
}

/// Summarization provider configuration (Anthropic Messages API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SummarizerConfig {
    /// Anthropic API key. `None` requires `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model used for summaries.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_summarizer_base_url")]
    pub base_url: String,

    /// Maximum tokens in the generated summary.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout.
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,

    /// Conversations with more characters than this are not summarized.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// System prompt for the summarization call.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_summarizer_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_summarizer_timeout_secs(),
            max_input_chars: default_max_input_chars(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_summarizer_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_summarizer_timeout_secs() -> u64 {
    60
}

fn default_max_input_chars() -> usize {
    48_000
}

fn default_system_prompt() -> String {
    "You summarize WhatsApp conversations between a business and a client. \
     Write a short neutral summary covering the client's requests, open questions, \
     and any commitments made."
        .to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and expose `GET /metrics`.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
