// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress HTTP server built on axum.
//!
//! Routes:
//! - `POST /webhooks/whatsapp` (signature checked by the service)
//! - `GET /health`
//! - `GET /metrics` (only when a Prometheus render function is supplied)

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use waflow_core::WaflowError;

use crate::crypto::SIGNATURE_HEADER;
use crate::service::IngressService;

/// Prometheus text renderer supplied by the binary.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct IngressState {
    pub service: Arc<IngressService>,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    pub prometheus_render: Option<MetricsRender>,
}

impl IngressState {
    pub fn new(service: Arc<IngressService>, prometheus_render: Option<MetricsRender>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

/// Response body for an accepted webhook.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub event_id: String,
    pub appended: usize,
    pub duplicates: usize,
    pub summaries_requested: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Builds the ingress router. Bodies over `max_body_bytes` get 413.
pub fn router(state: IngressState, max_body_bytes: usize) -> Router {
    let mut app = Router::new()
        .route("/webhooks/whatsapp", post(post_webhook))
        .route("/health", get(get_health));
    if state.prometheus_render.is_some() {
        app = app.route("/metrics", get(get_metrics));
    }
    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves `app` on `addr` until `shutdown` fires.
pub async fn serve(addr: &str, app: Router, shutdown: CancellationToken) -> Result<(), WaflowError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| WaflowError::Config(format!("failed to bind ingress to {addr}: {e}")))?;
    tracing::info!("ingress listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| WaflowError::Internal(format!("ingress server error: {e}")))
}

/// POST /webhooks/whatsapp
async fn post_webhook(
    State(state): State<IngressState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.service.ingest(&body, signature).await {
        Ok(report) => {
            metrics::counter!("waflow_webhooks_total", "result" => "accepted").increment(1);
            (
                StatusCode::OK,
                Json(AcceptedResponse {
                    event_id: report.event_id,
                    appended: report.appended,
                    duplicates: report.duplicates,
                    summaries_requested: report.summaries_requested,
                }),
            )
                .into_response()
        }
        Err(e) => {
            let (status, result) = classify(&e);
            metrics::counter!("waflow_webhooks_total", "result" => result).increment(1);
            if status.is_server_error() {
                tracing::error!(error = %e, "webhook processing failed");
            } else {
                tracing::warn!(error = %e, "webhook rejected");
            }
            (status, Json(ErrorResponse { error: e.to_string() })).into_response()
        }
    }
}

/// Status code and metric label for a failed webhook.
fn classify(e: &WaflowError) -> (StatusCode, &'static str) {
    match e {
        WaflowError::Authentication(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        WaflowError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "malformed"),
        WaflowError::BrokerUnavailable { .. } | WaflowError::Timeout { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
        WaflowError::Storage { .. } => (StatusCode::SERVICE_UNAVAILABLE, "storage"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
    }
}

/// GET /health
async fn get_health(State(state): State<IngressState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
async fn get_metrics(State(state): State<IngressState>) -> Response {
    match &state.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert_eq!(
            classify(&WaflowError::Authentication("x".into())).0,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            classify(&WaflowError::MalformedPayload("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            classify(&WaflowError::broker_unavailable("down")).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            classify(&WaflowError::Internal("x".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
