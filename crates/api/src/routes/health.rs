//! Health check endpoints.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Largest file an upload may declare, in bytes.
    pub max_file_size: u64,
    /// Lifetime of presigned URLs, in seconds.
    pub presign_ttl_secs: u64,
}

/// Health check handler. Also advertises upload limits to clients.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let config = state.uploads.config();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        max_file_size: config.max_file_size,
        presign_ttl_secs: config.presign_ttl_secs,
    })
}

/// Creates health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
