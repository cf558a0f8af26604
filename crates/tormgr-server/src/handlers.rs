use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::metrics::render_metrics;
use crate::state::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Ready when the database answers. A cache outage only degrades service, so
/// it is reported without failing the check.
pub async fn readyz(State(state): State<AppState>) -> Response {
    let cache_available = state.queries.store().backend().is_available().await;
    let cache_mode = state.queries.store().backend().mode();

    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "up",
                "cache": { "mode": cache_mode, "available": cache_available },
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unavailable",
                    "database": "down",
                    "cache": { "mode": cache_mode, "available": cache_available },
                })),
            )
                .into_response()
        }
    }
}

pub async fn metrics() -> Response {
    match render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not initialized").into_response(),
    }
}
