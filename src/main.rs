//! Seed list daemon entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio::signal;

mod cache;
mod config;
mod error;
mod filter;
mod orchestrator;
mod peer;
mod seedlist;
mod server;
mod types;

use cache::{run_refresh, SeedCache, SeedListGenerator};
use config::{Args, Config};
use filter::TaskFilter;
use orchestrator::SwarmOrchestrator;
use peer::JsonRpcPeerClient;
use seedlist::{load_signing_key, SeedListBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let args = Args::parse();
    let cfg = Config::load(&args)?;
    info!("Starting seed list daemon with config: {:?}", cfg);

    let signing_key = load_signing_key().context("Invalid signing seed")?;

    // Collaborators
    let orchestrator = Arc::new(SwarmOrchestrator::new(&cfg.docker_host)?);
    let peers = Arc::new(JsonRpcPeerClient::new(cfg.rpc_port, cfg.rpc_timeout)?);

    let mut generator = SeedListGenerator::new(
        orchestrator,
        peers,
        cfg.services.clone(),
        TaskFilter::new(cfg.network.clone()),
        SeedListBuilder::new(cfg.seed_scheme.clone(), cfg.seed_port, signing_key),
        cfg.rpc_timeout,
    );
    if !cfg.sort_peers {
        generator = generator.completion_order();
    }

    // Nothing is served until the first list exists.
    let initial = generator
        .generate()
        .await
        .context("Failed to generate initial seed list")?;
    let cache = SeedCache::new(initial.seed_list);

    // Background refresh
    let refresh_handle = tokio::spawn(run_refresh(
        cache.clone(),
        generator,
        cfg.refresh_interval,
    ));

    // HTTP endpoint
    let listener = TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen))?;
    info!("Serving seed list on {}", cfg.listen);
    let served = axum::serve(listener, server::router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    refresh_handle.abort();
    if let Err(e) = served {
        error!("HTTP server died: {}", e);
        return Err(e.into());
    }
    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}
