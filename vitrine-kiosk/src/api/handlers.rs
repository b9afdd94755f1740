//! HTTP request handlers for the local status endpoint

use crate::api::server::AppContext;
use crate::state::CurrentPresentation;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub terminal_id: String,
    pub idle: bool,
    pub current: Option<CurrentPresentation>,
    pub presentations_total: usize,
    pub queued_records: usize,
    pub cached_media: usize,
    pub failed_media: usize,
    pub playlist_slots: usize,
    pub playlist_fetched_at: Option<chrono::DateTime<chrono::Utc>>,
    pub git_hash: String,
    pub build_timestamp: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "vitrine-kiosk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status - what the kiosk is doing right now
pub async fn status(
    State(ctx): State<AppContext>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let queued_records = ctx.log.len().await.map_err(|e| {
        error!("Failed to count playback log: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let snapshot = ctx.playlist.current_slots();

    Ok(Json(StatusResponse {
        terminal_id: ctx.state.terminal_id().to_string(),
        idle: ctx.state.is_idle(),
        current: ctx.state.current_presentation().await,
        presentations_total: ctx.state.presentations_total(),
        queued_records,
        cached_media: ctx.cache.cached_count(),
        failed_media: ctx.state.failed_count(),
        playlist_slots: snapshot.len(),
        playlist_fetched_at: snapshot.fetched_at(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
    }))
}
