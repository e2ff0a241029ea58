// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waflow status` command implementation.
//!
//! Reads queue depths straight from the state database and asks the ingress
//! health endpoint of a running instance. Works whether or not `serve` is up.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use waflow_config::WaflowConfig;
use waflow_core::{Broker, QueueStats, SystemClock, WaflowError};
use waflow_storage::{Database, SqliteBroker};

/// Health endpoint response from ingress.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_secs: u64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub running: bool,
    pub status: String,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub endpoint: String,
    pub queues: Vec<QueueStats>,
}

/// Format seconds into a human-readable duration string.
fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Run the `waflow status` command.
pub async fn run_status(config: &WaflowConfig, json: bool) -> Result<(), WaflowError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let queues = SqliteBroker::new(db.clone(), Arc::new(SystemClock))
        .stats()
        .await;
    db.close().await?;
    let queues = queues?;

    let endpoint = health_url(config);
    let health = fetch_health(&endpoint).await?;
    let status = StatusResponse {
        running: health.is_some(),
        status: health
            .as_ref()
            .map_or_else(|| "not running".to_string(), |h| h.status.clone()),
        uptime_secs: health.as_ref().map(|h| h.uptime_secs),
        uptime_human: health.as_ref().map(|h| format_uptime(h.uptime_secs)),
        endpoint,
        queues,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", render(&status));
    }
    Ok(())
}

fn health_url(config: &WaflowConfig) -> String {
    // A wildcard bind is reachable on loopback.
    let host = match config.ingress.bind_address.as_str() {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    };
    format!("http://{host}:{}/health", config.ingress.port)
}

/// `None` when nothing healthy answers on `url`.
async fn fetch_health(url: &str) -> Result<Option<HealthResponse>, WaflowError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| WaflowError::Internal(format!("failed to create HTTP client: {e}")))?;

    match client.get(url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let health = resp.json().await.map_err(|e| {
                WaflowError::Internal(format!("failed to parse health response: {e}"))
            })?;
            Ok(Some(health))
        }
        _ => Ok(None),
    }
}

fn render(status: &StatusResponse) -> String {
    let mut out = String::new();
    out.push_str("\n  waflow status\n");
    out.push_str(&format!("  {}\n", "-".repeat(35)));
    match &status.uptime_human {
        Some(uptime) if status.running => out.push_str(&format!(
            "    State:    [OK] {} (uptime: {uptime})\n",
            status.status
        )),
        _ => {
            out.push_str("    State:    [--] not running\n");
            out.push_str(&format!("    Endpoint: {}\n", status.endpoint));
        }
    }
    out.push('\n');
    out.push_str(&format!(
        "    {:<16}{:>10}{:>11}{:>11}{:>8}\n",
        "QUEUE", "ENQUEUED", "IN-FLIGHT", "SUCCEEDED", "DEAD"
    ));
    for q in &status.queues {
        out.push_str(&format!(
            "    {:<16}{:>10}{:>11}{:>11}{:>8}\n",
            q.queue, q.enqueued, q.in_flight, q.succeeded, q.dead_lettered
        ));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues() -> Vec<QueueStats> {
        vec![QueueStats {
            queue: "send_message".into(),
            enqueued: 4,
            in_flight: 1,
            succeeded: 10,
            dead_lettered: 2,
        }]
    }

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_hours() {
        assert_eq!(format_uptime(3720), "1h 2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[test]
    fn wildcard_bind_resolves_to_loopback() {
        let mut config = WaflowConfig::default();
        config.ingress.bind_address = "0.0.0.0".into();
        config.ingress.port = 8099;
        assert_eq!(health_url(&config), "http://127.0.0.1:8099/health");
    }

    #[test]
    fn offline_render_shows_endpoint_and_queues() {
        let status = StatusResponse {
            running: false,
            status: "not running".into(),
            uptime_secs: None,
            uptime_human: None,
            endpoint: "http://127.0.0.1:8080/health".into(),
            queues: queues(),
        };
        let out = render(&status);
        assert!(out.contains("not running"));
        assert!(out.contains("http://127.0.0.1:8080/health"));
        assert!(out.contains("send_message"));
    }

    #[test]
    fn status_response_serializes_queue_counts() {
        let status = StatusResponse {
            running: true,
            status: "healthy".into(),
            uptime_secs: Some(3600),
            uptime_human: Some("1h 0m".into()),
            endpoint: "http://127.0.0.1:8080/health".into(),
            queues: queues(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["queues"][0]["dead_lettered"], 2);
    }

    #[tokio::test]
    async fn closed_port_reads_as_not_running() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let health = fetch_health(&format!("http://127.0.0.1:{port}/health")).await.unwrap();
        assert!(health.is_none());
    }
}
