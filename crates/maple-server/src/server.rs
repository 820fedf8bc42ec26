//! Server startup and lifecycle

use crate::{routes, AppState, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// How often abandoned pending uploads are swept
const PENDING_GC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Periodically collect pending records whose upload URLs are long dead
fn spawn_pending_gc(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PENDING_GC_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match state.uploads.collect_expired_pending(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(count) => info!(count, "collected expired pending uploads"),
                Err(e) => warn!(error = %e, "pending-upload sweep failed"),
            }
        }
    });
}

/// Run the cloud service until the process exits
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.clone())?;
    spawn_pending_gc(Arc::clone(&state));
    let app = routes::create_router(state);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("MapleFile service listening on http://{}", config.bind_addr());

    axum::serve(listener, app).await?;
    Ok(())
}

/// Run the cloud service with graceful shutdown
pub async fn run_server_with_shutdown(
    config: ServerConfig,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState::new(config.clone())?;
    spawn_pending_gc(Arc::clone(&state));
    let app = routes::create_router(state);

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("MapleFile service listening on http://{}", config.bind_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("service shutdown complete");
    Ok(())
}
