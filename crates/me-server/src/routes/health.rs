//! Health, readiness, and metrics endpoints.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub process_alive: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// GET /health — aggregate readiness. 503 unless the managed process is
/// confirmed alive.
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let process_alive = state.process_alive();
    let (status_code, status) = if process_alive {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            process_alive,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// GET /healthz — liveness. Always 200 while the wrapper runs.
pub async fn healthz_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(LivenessResponse {
            status: "ok".to_string(),
        }),
    )
}

/// GET /ready — 503 unless the managed process is reported alive.
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.process_alive() {
        (
            StatusCode::OK,
            Json(LivenessResponse {
                status: "ready".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(LivenessResponse {
                status: "not ready".to_string(),
            }),
        )
    }
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.export(),
    )
}
