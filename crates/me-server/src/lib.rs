//! HTTP + WebSocket wrapper around a stdio MCP process.
//!
//! The `wrapper` binary spawns the configured command on demand and exposes
//! it over:
//! - `POST /mcp` — one request, one fresh process, one response
//! - `GET /mcp/stream` — WebSocket, one long-lived process per connection
//! - `GET /healthz`, `/health`, `/ready`, `/metrics` — operational surface

pub mod metrics;
pub mod routes;
pub mod shutdown;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use me_types::AppResult;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full router over shared state.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(routes::mcp::mcp_post_handler))
        .route("/mcp/stream", get(routes::mcp_ws::mcp_ws_handler))
        .route("/health", get(routes::health::health_handler))
        .route("/healthz", get(routes::health::healthz_handler))
        .route("/ready", get(routes::health::ready_handler))
        .route("/metrics", get(routes::health::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already-bound listener until the shutdown token fires.
/// Split out from [`start_server`] so tests can bind port 0.
pub async fn serve(listener: TcpListener, state: AppState) -> AppResult<()> {
    let token = state.shutdown.token();
    let app = build_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}

/// Bind the configured address and serve until shutdown.
pub async fn start_server(state: AppState) -> AppResult<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Wrapper listening on {}", addr);
    serve(listener, state).await
}
