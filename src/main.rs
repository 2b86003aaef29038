use std::sync::Arc;

use review_engine::config::Config;
use review_engine::dispatch::gateway::{self, DeliveryGateway, LogGateway, RetryPolicy};
use review_engine::logging::{init_tracing, LogConfig};
use review_engine::review::config::EngineConfig;
use review_engine::review::engine::ReviewEngine;
use review_engine::store::Store;
use review_engine::workers::WorkerManager;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig {
        log_level: config.log_level.clone(),
        enable_file_logs: config.enable_file_logs,
        log_dir: config.log_dir.clone(),
    });
    tracing::info!("Starting review-engine");

    // Validate delivery config at startup (panics if mock=false)
    gateway::validate_config(&config.delivery);

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let engine_config = EngineConfig::from_env(&config.engine);
    engine_config
        .validate()
        .expect("Invalid engine configuration");
    let engine = Arc::new(ReviewEngine::new(engine_config, store.clone()));

    let delivery_gateway: Arc<dyn DeliveryGateway> = Arc::new(LogGateway);
    let retry_policy = RetryPolicy::from_env(&config.delivery);

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let worker_manager = WorkerManager::new(
        store.clone(),
        engine,
        delivery_gateway,
        retry_policy,
        shutdown_tx.subscribe(),
        &config.worker,
    );
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker_manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    });

    shutdown_signal(shutdown_tx).await;

    match worker_handle.await {
        Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        Ok(()) => tracing::info!("Worker manager exited normally"),
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
