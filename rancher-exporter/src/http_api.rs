//! HTTP API.
//!
//! Provides:
//! - `{metrics_path}` - runs a scrape cycle and exports the result
//! - `/` - landing page linking to the metrics
//! - `/health` - basic liveness check

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::exporter::Exporter;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub exporter: Arc<Exporter>,
    /// Path the metrics handler is mounted on.
    pub metrics_path: String,
    pub version: &'static str,
    pub started_at: Instant,
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(index_handler))
        .route(&metrics_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

/// Handler for the metrics path.
///
/// A failed scrape cycle still answers 200 with whatever the sink holds;
/// only an encoding failure is an error.
async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    if let Err(e) = state.exporter.scrape().await {
        warn!("Serving partial metrics: {}", e);
    }

    match state.exporter.encode().await {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn index_handler(State(state): State<Arc<HttpState>>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Rancher exporter</title></head>\n\
         <body>\n\
         <h1>Rancher exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path
    ))
}

/// Handler for `/health`.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Serve the API on `addr` until ctrl-c or SIGTERM.
pub async fn serve(addr: SocketAddr, state: HttpState) -> std::io::Result<()> {
    let metrics_path = state.metrics_path.clone();
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, metrics_path = %metrics_path, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
