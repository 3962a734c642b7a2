//! HTTP request/response bridging.
//!
//! `POST /mcp` is one-shot: each call spawns a fresh process, forwards the
//! body as a single JSON-RPC request, awaits the single response, and tears
//! the process down. Failures never surface as bare 5xx bodies; every
//! outcome is a well-formed JSON-RPC envelope.

use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use me_bridge::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

/// Pull the id out of a body that failed envelope parsing, if there is one.
fn salvage_id(body: &str) -> Value {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

pub async fn mcp_post_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let started = Instant::now();

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting unparseable request body: {}", e);
            state.metrics.observe_error("protocol");
            state
                .metrics
                .observe_request("unknown", false, started.elapsed().as_secs_f64());
            return Json(JsonRpcResponse::error(
                salvage_id(&body),
                JsonRpcError::internal_error(format!("Invalid JSON-RPC request: {}", e)),
            ));
        }
    };

    let method = request.method.clone();
    let original_id = request.id.clone().unwrap_or(Value::Null);
    debug!("HTTP bridge request: method={}", method);

    let bridge = match state.spawn_bridge().await {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!("Failed to spawn process for HTTP request: {}", e);
            state.metrics.observe_error(e.kind());
            state
                .metrics
                .observe_request(&method, false, started.elapsed().as_secs_f64());
            return Json(JsonRpcResponse::error(
                original_id,
                JsonRpcError::internal_error(format!("Failed to start process: {}", e)),
            ));
        }
    };

    let result = bridge.send_request(request).await;
    bridge.close().await;

    let duration = started.elapsed().as_secs_f64();
    match result {
        Ok(response) => {
            state
                .metrics
                .observe_request(&method, !response.is_error(), duration);
            Json(response)
        }
        Err(e) => {
            warn!("HTTP bridge request failed: method={} error={}", method, e);
            state.metrics.observe_error(e.kind());
            state.metrics.observe_request(&method, false, duration);
            Json(JsonRpcResponse::error(
                original_id,
                JsonRpcError::internal_error(e.to_string()),
            ))
        }
    }
}
