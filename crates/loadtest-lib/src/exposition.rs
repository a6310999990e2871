//! HTTP endpoint exposing the run's Prometheus registry while the load runs

use crate::observability::LoadTestMetrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use tracing::{error, info};

/// Prometheus metrics endpoint
async fn metrics(State(metrics): State<LoadTestMetrics>) -> impl IntoResponse {
    match metrics.encode_text() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                Vec::new(),
            )
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// Create the exposition router
pub fn create_router(sinks: LoadTestMetrics) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(sinks)
}

/// Serve `/metrics` on `port` until the task is dropped
pub async fn serve(port: u16, sinks: LoadTestMetrics) -> anyhow::Result<()> {
    let app = create_router(sinks);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting metrics server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
