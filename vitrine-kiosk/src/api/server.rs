//! HTTP server setup and routing
//!
//! Local read-only status endpoint, bound to loopback.

use crate::cache::MediaCache;
use crate::error::{Error, Result};
use crate::playback::PlaybackLog;
use crate::playlist::PlaylistSync;
use crate::state::SharedState;
use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub log: Arc<PlaybackLog>,
    pub cache: Arc<MediaCache>,
    pub playlist: Arc<PlaylistSync>,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        .route("/status", get(super::handlers::status))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves
pub async fn run(
    port: u16,
    ctx: AppContext,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting status server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
