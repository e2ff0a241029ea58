// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waflow serve` command implementation.
//!
//! Opens the shared SQLite database, builds the state store, broker, gateway
//! and summarizer, then runs the worker pools, the periodic scheduler and the
//! ingress HTTP server until SIGINT/SIGTERM. Shutdown order: stop accepting
//! webhooks, stop the scheduler, drain the pools (in-flight tasks get the
//! configured grace period, then are requeued), shut adapters down, close the
//! database.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use waflow_anthropic::AnthropicSummarizer;
use waflow_broker::ConsumerSettings;
use waflow_config::WaflowConfig;
use waflow_core::{
    Broker, Clock, HealthStatus, MessageGateway, PluginAdapter, StateStore, Summarizer,
    SystemClock, WaflowError,
};
use waflow_cron::{PeriodicScheduler, SchedulerSettings};
use waflow_dispatch::{DispatchSettings, TaskDispatcher};
use waflow_ingress::{IngressService, IngressSettings, IngressState, MetricsRender, router, serve};
use waflow_storage::{Database, SqliteBroker, SqliteStore};
use waflow_whatsapp::WhatsAppGateway;
use waflow_worker::{
    Handlers, PoolSpec, WorkerPool, handler_settings, install_signal_handler, runner_from_config,
};

/// Added to the handler grace period when waiting for workers to exit.
const POOL_EXIT_SLACK: Duration = Duration::from_secs(5);

/// The adapters `serve` runs against.
pub(crate) struct Services {
    pub store: Arc<dyn StateStore>,
    pub broker: Arc<dyn Broker>,
    pub gateway: Arc<dyn MessageGateway>,
    pub summarizer: Arc<dyn Summarizer>,
    pub clock: Arc<dyn Clock>,
}

/// Runs the `waflow serve` command.
pub async fn run_serve(config: WaflowConfig) -> Result<(), WaflowError> {
    init_tracing(&config.service.log_level);
    info!(name = config.service.name.as_str(), "starting waflow serve");

    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services {
        store: Arc::new(SqliteStore::new(db.clone(), clock.clone())),
        broker: Arc::new(SqliteBroker::new(db.clone(), clock.clone())),
        gateway: Arc::new(WhatsAppGateway::from_config(&config.whatsapp)?),
        summarizer: Arc::new(AnthropicSummarizer::from_config(&config.summarizer)?),
        clock,
    };
    let metrics = metrics_render(&config)?;

    let cancel = install_signal_handler();
    let result = run_services(&config, services, metrics, cancel).await;

    if let Err(e) = db.close().await {
        warn!(error = %e, "database close failed");
    }
    info!("waflow stopped");
    result
}

/// Runs every component until `cancel` fires or the ingress server fails.
pub(crate) async fn run_services(
    config: &WaflowConfig,
    services: Services,
    metrics: Option<MetricsRender>,
    cancel: CancellationToken,
) -> Result<(), WaflowError> {
    let Services {
        store,
        broker,
        gateway,
        summarizer,
        clock,
    } = services;

    judge_health(store.name(), store.health_check().await?)?;
    judge_health(broker.name(), broker.health_check().await?)?;
    judge_health(gateway.name(), gateway.health_check().await?)?;
    judge_health(summarizer.name(), summarizer.health_check().await?)?;

    let ingress_settings = IngressSettings::from_config(&config.ingress)?;
    let dispatcher = TaskDispatcher::new(
        broker.clone(),
        clock.clone(),
        DispatchSettings::from_config(config),
    );

    let handlers = Handlers::new(
        store.clone(),
        gateway.clone(),
        summarizer.clone(),
        dispatcher.clone(),
        clock.clone(),
        handler_settings(config),
    );
    let runner = Arc::new(runner_from_config(config, handlers, store.clone(), clock.clone()));
    let pools = WorkerPool::spawn(
        runner,
        broker.clone(),
        ConsumerSettings::from_config(&config.broker),
        &PoolSpec::defaults(
            config.worker.outreach_workers,
            config.worker.summarize_workers,
        ),
        cancel.child_token(),
    );
    info!(workers = pools.size(), "worker pools started");

    let scheduler = if config.scheduler.enabled {
        let scheduler = Arc::new(PeriodicScheduler::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
            SchedulerSettings::from_config(&config.scheduler),
        ));
        Some(tokio::spawn(scheduler.run(cancel.clone())))
    } else {
        info!("periodic scheduler disabled");
        None
    };

    let service = Arc::new(IngressService::new(
        store.clone(),
        dispatcher,
        clock,
        ingress_settings,
    ));
    let app = router(
        IngressState::new(service, metrics),
        config.ingress.max_body_bytes,
    );
    let addr = format!("{}:{}", config.ingress.bind_address, config.ingress.port);
    let served = serve(&addr, app, cancel.clone()).await;

    // A failed bind returns before any signal arrives.
    cancel.cancel();
    info!("shutting down");

    if let Some(handle) = scheduler
        && let Err(e) = handle.await
    {
        error!(error = %e, "scheduler task panicked");
    }
    pools
        .shutdown(Duration::from_secs(config.worker.shutdown_grace_secs) + POOL_EXIT_SLACK)
        .await;

    log_shutdown(gateway.name(), gateway.shutdown().await);
    log_shutdown(summarizer.name(), summarizer.shutdown().await);
    log_shutdown(broker.name(), broker.shutdown().await);
    log_shutdown(store.name(), store.shutdown().await);

    served
}

/// Logs an adapter's startup health. Unhealthy adapters abort startup.
fn judge_health(adapter: &str, status: HealthStatus) -> Result<(), WaflowError> {
    match status {
        HealthStatus::Healthy => {
            info!(adapter, "adapter healthy");
            Ok(())
        }
        HealthStatus::Degraded(reason) => {
            warn!(adapter, reason = reason.as_str(), "adapter degraded");
            Ok(())
        }
        HealthStatus::Unhealthy(reason) => Err(WaflowError::Internal(format!(
            "adapter {adapter} is unhealthy: {reason}"
        ))),
    }
}

fn log_shutdown(adapter: &str, result: Result<(), WaflowError>) {
    if let Err(e) = result {
        warn!(adapter, error = %e, "adapter shutdown failed");
    }
}

#[cfg(feature = "prometheus")]
fn metrics_render(config: &WaflowConfig) -> Result<Option<MetricsRender>, WaflowError> {
    if !config.prometheus.enabled {
        return Ok(None);
    }
    let adapter = Arc::new(waflow_prometheus::PrometheusAdapter::new()?);
    Ok(Some(Arc::new(move || adapter.render())))
}

#[cfg(not(feature = "prometheus"))]
fn metrics_render(config: &WaflowConfig) -> Result<Option<MetricsRender>, WaflowError> {
    if config.prometheus.enabled {
        warn!("prometheus.enabled is set but waflow was built without the prometheus feature");
    }
    Ok(None)
}

/// Initialize the tracing subscriber with an env-filter.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("waflow={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
