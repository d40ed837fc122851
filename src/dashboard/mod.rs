//! Dashboard Module
//!
//! Provides a JSON API for monitoring signals and rule statistics.
//! Only compiled when the `dashboard` feature is enabled.

mod api;
mod types;

pub use api::create_router;
pub use types::*;

use tokio::sync::watch;

use crate::engine::SharedEngine;

/// Start the dashboard server
pub async fn start_server(
    engine: SharedEngine,
    bind_addr: &str,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = create_router(engine);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    tracing::info!("🖥️ Dashboard API starting on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}
