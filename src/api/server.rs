//! HTTP server setup and routing

use super::handlers;
use crate::{config::ServerConfig, service::ScanService};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub service: ScanService,
}

impl AppState {
    pub fn new(service: ScanService) -> Self {
        Self { service }
    }
}

pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health))
        .route("/api/v1/image_server/:z/:y/:x", get(handlers::get_tile))
        .route(
            "/api/v1/scans/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route("/api/v1/scans", post(handlers::create_scan))
        .route("/api/v1/scans/random", get(handlers::random_scan))
        .route("/api/v1/scans/:scan_id", get(handlers::scan_metadata))
        .route(
            "/api/v1/scans/:scan_id/slices",
            get(handlers::list_slices).post(handlers::upload_slice),
        )
        .route(
            "/api/v1/scans/:scan_id/validation_mask",
            get(handlers::validation_mask),
        )
        .route("/api/v1/scans/:scan_id/label", post(handlers::add_label))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until ctrl-c
pub async fn run(config: ServerConfig, state: AppState) -> std::io::Result<()> {
    let app = create_router(state, &config);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    info!("shutting down");
}
