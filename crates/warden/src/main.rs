//! Runtime Warden daemon
//!
//! Tracks the execution cost of scripted workload units, escalates
//! repeated limit violations per owner, and serves reports and controls
//! over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use warden_lib::{
    combined::CombinedSweep,
    health::{components, HealthRegistry},
    store::run_cleanup_loop,
    ClusterSync, ConfigHandle, LoopbackTransport, PunishmentEngine, ReportAggregator,
    RuntimeStore, WardenLogger, WardenMetrics,
};

mod api;
mod config;
mod sink;

const WARDEN_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with env-filter control
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting runtime-warden");

    let daemon_config = config::DaemonConfig::load()?;
    let limits = daemon_config.load_limits()?;
    info!(
        node_id = daemon_config.node_id,
        enabled = limits.enabled,
        "Warden configured"
    );

    let health = HealthRegistry::new();
    health.register(components::STORE).await;
    health.register(components::SWEEPER).await;
    health.register(components::CLUSTER).await;
    health.register(components::REPORTER).await;

    let metrics = WardenMetrics::new();
    let logger = WardenLogger::new(daemon_config.node_id);
    logger.log_startup(WARDEN_VERSION);

    let store = Arc::new(RuntimeStore::new());
    let config_handle = Arc::new(ConfigHandle::new(limits));
    let enforcement: Arc<dyn warden_lib::EnforcementSink> = Arc::new(sink::LogSink);

    let engine = PunishmentEngine::new(
        store.clone(),
        config_handle.clone(),
        enforcement.clone(),
        metrics.clone(),
        logger.clone(),
    );

    // Peer wiring is supplied by the hosting application; standalone
    // deployments run without peers.
    let cluster = Arc::new(ClusterSync::new(
        config_handle.clone(),
        store.clone(),
        Arc::new(LoopbackTransport),
        metrics.clone(),
        logger.clone(),
    ));

    let aggregator = Arc::new(ReportAggregator::new(
        store.clone(),
        config_handle.clone(),
        Some(cluster.clone()),
        metrics.clone(),
        logger.clone(),
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let sweep = CombinedSweep::new(store.clone(), config_handle.clone(), engine.clone());
    tokio::spawn(sweep.run(shutdown_tx.subscribe()));

    tokio::spawn(run_cleanup_loop(
        store.clone(),
        enforcement.clone(),
        config_handle.clone(),
        shutdown_tx.subscribe(),
    ));

    // Drop report rounds nobody collected
    {
        let cluster = cluster.clone();
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cluster.purge_stale_round(std::time::Duration::from_secs(60));
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    let app_state = Arc::new(api::AppState::new(
        engine,
        aggregator,
        cluster,
        health.clone(),
    ));

    health.set_ready(true).await;

    tokio::spawn(api::serve(daemon_config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    info!("Shutting down");

    Ok(())
}
