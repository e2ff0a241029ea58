// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exposition for the `waflow_*` series.
//!
//! Dispatcher, workers, scheduler and ingress call the `metrics` macros; this
//! crate owns the recorder and renders what ingress serves on `/metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use waflow_core::{AdapterType, HealthStatus, PluginAdapter, WaflowError};

pub use recording::register_metrics;

/// Owner of the process-wide Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the global recorder and describes every `waflow_*` series.
    ///
    /// Fails when another recorder already owns the process.
    pub fn new() -> Result<Self, WaflowError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            WaflowError::Internal(format!("metrics recorder already taken: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("serving waflow_* metrics in prometheus format");

        Ok(Self { handle })
    }

    /// Wraps an existing handle without touching the global recorder.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Text exposition body for `/metrics`.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, WaflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WaflowError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_metrics_recorded_under_a_local_recorder() {
        // A local recorder avoids clobbering the process-global one.
        let recorder = PrometheusBuilder::new().build_recorder();
        let adapter = PrometheusAdapter::from_handle(recorder.handle());
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("waflow_webhooks_total", "result" => "accepted").increment(2);
        });
        let text = adapter.render();
        assert!(text.contains("waflow_webhooks_total"));
        assert!(text.contains("result=\"accepted\""));
        assert_eq!(adapter.adapter_type(), AdapterType::Observability);
    }
}
