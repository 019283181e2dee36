//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST API routes for the upload lifecycle
//! - Error rendering for core errors
//! - Response types

pub mod error;
pub mod extract;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use stowage_core::upload::UploadService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Upload lifecycle service.
    pub uploads: Arc<UploadService>,
}

impl AppState {
    /// Create state around an upload service.
    #[must_use]
    pub fn new(uploads: UploadService) -> Self {
        Self {
            uploads: Arc::new(uploads),
        }
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
