//! HTTP server: router and serve loop.

use std::future::Future;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sigrelay_telemetry::gather_text;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{GatewayError, GatewayResult};
use crate::mass_trade;
use crate::state::AppState;
use crate::webhook::handle_webhook;

/// Create the router with every route.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/api/webhook", post(handle_webhook))
        .route(
            "/api/mass-trade/configs/{id}/execute",
            post(mass_trade::execute),
        )
        .route(
            "/api/mass-trade/configs/{id}/close-all",
            post(mass_trade::close_all),
        )
        .route(
            "/api/mass-trade/configs/{id}/executions",
            get(mass_trade::executions),
        )
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> Response {
    match gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve until `shutdown` resolves. In-flight requests are drained.
pub async fn run_server<F>(state: AppState, shutdown: F) -> GatewayResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.bind_addr();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Internal(format!("bind {addr}: {e}")))?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| GatewayError::Internal(format!("server: {e}")))?;

    info!("Gateway stopped");
    Ok(())
}
