pub mod handlers;
pub mod types;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::detector::Detector;

pub struct AppState {
    pub detector: Arc<Detector>,
    pub max_batch: usize,
}

pub fn router(detector: Arc<Detector>, max_batch: usize) -> Router {
    let state = Arc::new(AppState {
        detector,
        max_batch,
    });

    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/fraud/analyze", post(handlers::analyze))
        .route("/api/v1/fraud/batch", post(handlers::batch))
        .route("/api/v1/fraud/stats", get(handlers::stats))
        .route(
            "/api/v1/fraud/rules",
            get(handlers::list_rules).post(handlers::add_rule),
        )
        .route("/api/v1/fraud/rules/{id}", delete(handlers::delete_rule))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` is cancelled, then drain in-flight requests.
pub async fn serve(
    detector: Arc<Detector>,
    max_batch: usize,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(detector, max_batch);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("API server stopped");
    Ok(())
}
