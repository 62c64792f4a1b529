use std::path::Path;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::handlers::{info as info_routes, upload};
use crate::state::AppState;
use crate::storage::{OUTPUTS_MOUNT, UPLOADS_MOUNT};

/// Headroom for multipart boundaries and text fields on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let uploads = ServeDir::new(state.upload_dir.clone());
    let outputs = ServeDir::new(state.output_dir.clone());

    Router::new()
        .route("/api", get(info_routes::api_index))
        .route("/api/health", get(info_routes::health))
        .route("/api/scenes", get(info_routes::list_scenes))
        .route("/api/scene-types", get(info_routes::list_scenes))
        .route("/api/demographics", get(info_routes::list_demographics))
        .route("/api/upload", post(upload::upload_handler))
        .nest_service(&format!("/{UPLOADS_MOUNT}"), uploads)
        .nest_service(&format!("/{OUTPUTS_MOUNT}"), outputs)
        .fallback_service(ServeDir::new(public_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run(state: AppState, config: &Config) -> Result<()> {
    let addr = config.bind_address();
    let app = build_router(state.clone(), &config.public_dir);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("-------------------------------------------");
    info!("  Product photoshoot v{}", state.version);
    info!("  Listening on: http://{}", addr);
    info!("  Model: {}", state.generator.model());
    info!("  Upload: POST http://{}/api/upload", addr);
    info!("  Uploads dir: {}", state.upload_dir.display());
    info!("  Outputs dir: {}", state.output_dir.display());
    info!("-------------------------------------------");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
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
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
