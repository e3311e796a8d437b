use astrotrack_backend::config;
use astrotrack_backend::module::ephemeris::{BatchAcquirer, CacheGate, EphemerisSource, Fetcher, HorizonsClient};
use astrotrack_backend::module::scheduled::{ScheduledTaskConfig, ScheduledTaskManager};
use astrotrack_backend::service::{self, AppState};

use anyhow::{Context, Result};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    // Load configuration
    let config_found = config::read_config()?;
    let config = config::CONFIG.get().context("Configuration not loaded")?;

    // Initialize logging
    let _logging_guard = astrotrack_backend::logging::init_logging(
        &config.log_dir,
        "astrotrack-backend",
        &config.log_level,
        once,
    )?;

    if config_found {
        tracing::info!("Configuration loaded from file");
    } else {
        tracing::info!("No configuration file found, using defaults");
    }

    let client = HorizonsClient::new(
        config.horizons.url.as_str(),
        config.request_timeout(),
        config.horizons.user_agent.as_deref(),
    )?;
    let source: Arc<dyn EphemerisSource> = Arc::new(client);
    let acquirer = BatchAcquirer::new(Fetcher::new(source, config.retry_policy()), config.pacing());
    let registry = config.registry()?;
    tracing::info!("Tracking {} bodies via {}", registry.len(), config.horizons.url);

    let gate: Arc<CacheGate<dyn EphemerisSource>> =
        Arc::new(CacheGate::new(acquirer, registry, config.gate_settings()));

    if once {
        return run_once(&gate).await;
    }

    tracing::info!("AstroTrack backend starting...");

    let mut task_manager = None;
    if let Some(warm_interval) = config.warm_interval() {
        let task_config = ScheduledTaskConfig {
            warm_interval,
            perform_initial_update: true,
        };
        let mut manager = ScheduledTaskManager::new(task_config, gate.clone());
        manager.start_all();
        task_manager = Some(manager);
    } else {
        tracing::info!("Cache warm-up disabled, positions are acquired on demand");
    }

    let app = service::router(AppState::new(gate));
    let server_addr = config.server_address();
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_addr))?;

    tracing::info!("HTTP server listening on http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(manager) = task_manager {
        manager.shutdown();
    }
    tracing::info!("AstroTrack backend stopped");

    Ok(())
}

/// One acquisition cycle, batch JSON on stdout.
async fn run_once(gate: &CacheGate<dyn EphemerisSource>) -> Result<()> {
    let batch = gate.request(true).await.context("Acquisition failed")?;
    let json = serde_json::to_string_pretty(&batch)?;
    println!("{}", json);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
