//! Workload Controller - prediction-driven resource control loop
//!
//! Forecasts per-container and per-node workload, derives requests/limits
//! recommendations, and computes variance-minimizing pod placements,
//! writing everything back to the configured store.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use controller_lib::health::{components, HealthRegistry};
use controller_lib::observability::{ControllerMetrics, CycleLogger};
use controller_lib::orchestrator::PredictionOrchestrator;
use controller_lib::recommend::RecommendationEngine;
use controller_lib::schedule::Scheduler;
use controller_lib::store::{file::FileStore, http::HttpStore, Store};
use controller_lib::Forecaster;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreBackend {
    /// Remote HTTP JSON store.
    Http,
    /// Local directory of JSON documents.
    File,
}

#[derive(Debug, Parser)]
#[command(name = "workload-controller", version)]
struct Args {
    /// Storage backend the poll loops run against.
    #[arg(long, value_enum, default_value_t = StoreBackend::Http)]
    store: StoreBackend,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting workload-controller");

    // Configuration is process-fatal when unloadable; everything after
    // this point degrades per cycle instead of exiting.
    let settings = config::ControllerSettings::load()?;

    let store: Arc<dyn Store> = match args.store {
        StoreBackend::Http => Arc::new(HttpStore::new(&settings.store_endpoint)?),
        StoreBackend::File => Arc::new(FileStore::new(&settings.store_dir)),
    };
    let backend_name = match args.store {
        StoreBackend::Http => "http",
        StoreBackend::File => "file",
    };

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::FORECASTER).await;
    health_registry.register(components::RECOMMENDER).await;
    health_registry.register(components::SCHEDULER).await;

    let metrics = ControllerMetrics::new();
    CycleLogger::log_startup(CONTROLLER_VERSION, backend_name);

    let orchestrator = Arc::new(PredictionOrchestrator::new(
        store,
        settings.orchestrator_config(),
        Forecaster::new(settings.forecast_config()),
        RecommendationEngine::new(settings.recommend_config()),
        Scheduler::new(settings.build_policy(), settings.schedule_config()),
        health_registry.clone(),
    ));

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let pod_loop = tokio::spawn(
        orchestrator
            .clone()
            .run_pod_prediction_loop(shutdown_tx.subscribe()),
    );
    let node_loop = tokio::spawn(
        orchestrator
            .clone()
            .run_node_prediction_loop(shutdown_tx.subscribe()),
    );
    let recommendation_loop = tokio::spawn(
        orchestrator
            .clone()
            .run_recommendation_loop(shutdown_tx.subscribe()),
    );

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    CycleLogger::log_shutdown("SIGINT received");

    // Let in-flight cycles finish; the loops exit between cycles.
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(pod_loop, node_loop, recommendation_loop);
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
