//! Fleet Agent - long-running utilization monitor
//!
//! Polls the provider inventory on a fixed delay, keeps per-instance
//! utilization series on disk, and exposes health, metrics and the latest
//! verdicts over HTTP.

use fleet_lib::{
    health::HealthRegistry,
    observability::StructuredLogger,
    poll::PollLoopBuilder,
    provider::AwsCli,
    store::FileSeriesStore,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::AgentConfig::load()?;
    info!(region = %config.region, data_dir = %config.data_dir.display(), "Agent configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.region);
    logger.log_startup(AGENT_VERSION, true);

    let store = FileSeriesStore::open(&config.data_dir).with_context(|| {
        format!("Failed to open data directory {}", config.data_dir.display())
    })?;
    let provider = Arc::new(AwsCli::with_binary(&config.aws_binary, &config.region));

    let (poll_loop, mut outcomes) = PollLoopBuilder::new()
        .provider(provider)
        .store(Arc::new(store))
        .config(config.poll_config()?)
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry));

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    let recorder = {
        let state = app_state.clone();
        tokio::spawn(async move {
            while let Some(outcome) = outcomes.recv().await {
                state.record(outcome).await;
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let poll_handle = tokio::spawn(poll_loop.run(shutdown_rx));

    // The API server only returns on failure; treat that like a shutdown request
    let api_failure = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("SIGINT received, finishing current cycle");
            None
        }
        joined = &mut api_handle => {
            let failure = match joined {
                Ok(Ok(())) => anyhow::anyhow!("API server exited"),
                Ok(Err(e)) => e,
                Err(e) => anyhow::Error::new(e).context("API server task failed"),
            };
            error!(error = %format!("{:#}", failure), "API server stopped, finishing current cycle");
            Some(failure)
        }
    };
    let _ = shutdown_tx.send(());

    match poll_handle.await {
        Ok(cycles) => info!(cycles, "Poll loop stopped"),
        Err(e) => error!(error = %e, "Poll loop task failed"),
    }
    let _ = recorder.await;

    match api_failure {
        Some(failure) => Err(failure),
        None => {
            api_handle.abort();
            Ok(())
        }
    }
}
