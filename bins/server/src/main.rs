//! Stowage API Server
//!
//! Main entry point for the resumable upload service.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stowage_api::{AppState, create_router};
use stowage_core::storage::{ProfileResolver, StorageResolver};
use stowage_core::upload::{FsKv, UploadService};
use stowage_shared::LoggingConfig;

use crate::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("failed to load configuration")?;
    init_tracing(&settings.logging);

    // Fail fast on a broken default storage profile
    let resolver = Arc::new(ProfileResolver::new(settings.storage.clone()));
    let handle = resolver
        .resolve(None)
        .await
        .context("failed to initialize default storage")?;
    info!(
        profile = %handle.profile_id,
        backend = %handle.kind,
        "Storage configured"
    );

    let uploads = &settings.uploads;
    tokio::fs::create_dir_all(uploads.sessions_dir())
        .await
        .with_context(|| format!("failed to create {}", uploads.sessions_dir().display()))?;
    tokio::fs::create_dir_all(uploads.chunks_dir())
        .await
        .with_context(|| format!("failed to create {}", uploads.chunks_dir().display()))?;

    let kv = Arc::new(FsKv::new(uploads.sessions_dir()));
    let state = AppState::new(UploadService::new(uploads.clone(), resolver, kv));

    if let Some(interval) = uploads.sweep_interval() {
        spawn_maintenance(state.uploads.clone(), interval, uploads.session_ttl());
    }

    let app = create_router(state);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_or_default()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodically finish interrupted cleanups and sweep abandoned sessions.
fn spawn_maintenance(uploads: Arc<UploadService>, interval: Duration, session_ttl: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = uploads.recover_pending_cleanups().await {
                warn!(error = %err, "Cleanup recovery failed");
            }
            if let Err(err) = uploads.sweep_stale(session_ttl).await {
                warn!(error = %err, "Stale session sweep failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Received termination signal, shutting down");
}
