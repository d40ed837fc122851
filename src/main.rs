//! Confluence signal engine
//!
//! Polls the outcome feed, runs the rule library and serves the dashboard.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use confluence::config::AppConfig;
use confluence::feed::{FeedPoller, HttpFeed};
use confluence::{Engine, SharedEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.logging.json);

    info!("🚀 Confluence {} starting", env!("CARGO_PKG_VERSION"));
    info!("⚙️ {}", config.digest());

    let clock = Arc::new(config.clock()?);
    let engine = Engine::new(config.engine_config()?, clock).context("Failed to build engine")?;
    let engine = SharedEngine::new(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let feed = HttpFeed::new(&config.feed)?;
    let poller = FeedPoller::new(feed, engine.clone(), &config.feed);
    let poller_handle = tokio::spawn(poller.run(shutdown_rx.clone()));

    #[cfg(feature = "dashboard")]
    let dashboard_handle = {
        let engine = engine.clone();
        let bind_addr = config.dashboard.bind_addr.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = confluence::dashboard::start_server(engine, &bind_addr, shutdown).await {
                error!(error = %e, "Dashboard server failed");
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("🛑 Shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_handle.await {
        error!(error = %e, "Feed poller task panicked");
    }
    #[cfg(feature = "dashboard")]
    {
        if let Err(e) = dashboard_handle.await {
            error!(error = %e, "Dashboard task panicked");
        }
    }

    let snapshot = engine.snapshot();
    info!(
        waiting = snapshot.active_signals.len(),
        finalized = snapshot.finalized_signals.len(),
        won = snapshot.diagnostics.signals_won,
        lost = snapshot.diagnostics.signals_lost,
        "👋 Confluence stopped"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
