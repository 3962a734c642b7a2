//! WebSocket session bridging.
//!
//! `GET /mcp/stream` upgrades to a WebSocket backed by one long-lived
//! process. Each inbound text message is one JSON-RPC request; each settled
//! response goes back as one outbound message, in whatever order the process
//! answers. The session ends when the client disconnects, the process dies
//! (close code 1011), or the server shuts down (close code 1001).
//!
//! Uses graceful shutdown via broadcast channel to avoid abrupt task
//! cancellation; outbound traffic is serialized through an mpsc channel so
//! concurrent request tasks never interleave writes.

use crate::state::AppState;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use me_bridge::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ProcessBridge};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Close code sent when the wrapper is shutting down.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code sent when the managed process died under the session.
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// How often the session checks that its process is still alive.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

pub async fn mcp_ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}

async fn handle_session(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // One process per session; no process, no session.
    let bridge = match state.spawn_bridge().await {
        Ok(bridge) => bridge,
        Err(e) => {
            warn!("Failed to spawn process for WebSocket session: {}", e);
            state.metrics.observe_error(e.kind());
            let _ = sender
                .send(close_message(CLOSE_INTERNAL_ERROR, "failed to start process"))
                .await;
            return;
        }
    };

    state.metrics.active_connections.inc();
    info!("WebSocket session started");

    // Channel for sending messages from multiple tasks
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    // Session-local shutdown signal for graceful termination
    let (shutdown_tx, mut shutdown_rx1) = tokio::sync::broadcast::channel::<()>(1);
    let mut shutdown_rx2 = shutdown_tx.subscribe();

    // Task 1: watch for process death and server shutdown
    let tx_watch = tx.clone();
    let shutdown_tx_watch = shutdown_tx.clone();
    let bridge_watch = bridge.clone();
    let mut server_shutdown = state.shutdown.subscribe();
    let shutdown_state = state.clone();
    let watch_task = tokio::spawn(async move {
        // Subscribed above; this catches a shutdown that fired in between.
        if shutdown_state.shutdown.is_shutting_down() {
            let _ = tx_watch.send(close_message(CLOSE_GOING_AWAY, "server shutting down"));
            let _ = shutdown_tx_watch.send(());
            return;
        }
        let mut interval = tokio::time::interval(LIVENESS_INTERVAL);
        interval.tick().await; // first tick completes immediately
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx1.recv() => {
                    break;
                }
                _ = server_shutdown.recv() => {
                    debug!("Server shutdown reached WebSocket session");
                    let _ = tx_watch.send(close_message(CLOSE_GOING_AWAY, "server shutting down"));
                    let _ = shutdown_tx_watch.send(());
                    break;
                }
                _ = interval.tick() => {
                    if !bridge_watch.is_alive() {
                        warn!("Managed process died, closing WebSocket session");
                        let _ = tx_watch.send(close_message(CLOSE_INTERNAL_ERROR, "process exited"));
                        let _ = shutdown_tx_watch.send(());
                        break;
                    }
                }
            }
        }
    });

    // Task 2: handle incoming messages, one request task per message
    let tx_recv = tx.clone();
    let shutdown_tx_recv = shutdown_tx.clone();
    let bridge_recv = bridge.clone();
    let state_recv = state.clone();
    let receive_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx2.recv() => {
                    break;
                }
                msg_opt = receiver.next() => {
                    match msg_opt {
                        Some(Ok(Message::Text(text))) => {
                            spawn_request_task(
                                text.to_string(),
                                bridge_recv.clone(),
                                state_recv.clone(),
                                tx_recv.clone(),
                            );
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket close received from client");
                            let _ = shutdown_tx_recv.send(());
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("WebSocket receive error: {}", e);
                            let _ = shutdown_tx_recv.send(());
                            break;
                        }
                        None => {
                            let _ = shutdown_tx_recv.send(());
                            break;
                        }
                        _ => {
                            // Ignore Binary, Ping, Pong
                        }
                    }
                }
            }
        }
    });

    // Task 3: drain the send channel into the socket
    let shutdown_tx_send = shutdown_tx.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if let Err(e) = sender.send(msg).await {
                debug!("WebSocket send error (client likely disconnected): {}", e);
                let _ = shutdown_tx_send.send(());
                break;
            }
            if is_close {
                let _ = shutdown_tx_send.send(());
                break;
            }
        }
    });

    let _ = tokio::join!(watch_task, receive_task, send_task);

    bridge.close().await;
    state.metrics.active_connections.dec();
    info!("WebSocket session closed");
}

/// Forward one inbound message to the process without blocking the read
/// loop; responses go back through the shared send channel.
fn spawn_request_task(
    text: String,
    bridge: Arc<ProcessBridge>,
    state: AppState,
    tx: tokio::sync::mpsc::UnboundedSender<Message>,
) {
    tokio::spawn(async move {
        let started = Instant::now();

        let request: JsonRpcRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                state.metrics.observe_error("protocol");
                state
                    .metrics
                    .observe_request("unknown", false, started.elapsed().as_secs_f64());
                let id = serde_json::from_str::<Value>(&text)
                    .ok()
                    .and_then(|v| v.get("id").cloned())
                    .unwrap_or(Value::Null);
                send_response(
                    &tx,
                    JsonRpcResponse::error(
                        id,
                        JsonRpcError::internal_error(format!("Invalid JSON-RPC request: {}", e)),
                    ),
                );
                return;
            }
        };

        let method = request.method.clone();
        let original_id = request.id.clone().unwrap_or(Value::Null);

        let response = match bridge.send_request(request).await {
            Ok(response) => {
                state.metrics.observe_request(
                    &method,
                    !response.is_error(),
                    started.elapsed().as_secs_f64(),
                );
                response
            }
            Err(e) => {
                debug!("WebSocket bridge request failed: method={} error={}", method, e);
                state.metrics.observe_error(e.kind());
                state
                    .metrics
                    .observe_request(&method, false, started.elapsed().as_secs_f64());
                JsonRpcResponse::error(original_id, JsonRpcError::internal_error(e.to_string()))
            }
        };

        send_response(&tx, response);
    });
}

fn send_response(tx: &tokio::sync::mpsc::UnboundedSender<Message>, response: JsonRpcResponse) {
    match serde_json::to_string(&response) {
        Ok(text) => {
            let _ = tx.send(Message::Text(text.into()));
        }
        Err(e) => {
            warn!("Failed to serialize response: {}", e);
        }
    }
}
