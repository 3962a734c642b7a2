//! End-to-end tests for the wrapper's HTTP and WebSocket surface.
//!
//! Servers bind port 0 and run against small `sh` scripts standing in for
//! MCP processes, so no network or external runtime is needed.

use futures_util::{SinkExt, StreamExt};
use me_config::ServerConfig;
use me_server::metrics::Metrics;
use me_server::shutdown::ShutdownCoordinator;
use me_server::state::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const ECHO_SCRIPT: &str =
    r#"while IFS= read -r line; do printf '%s\n' "$line" | sed 's/"method":"[^"]*"/"result":"ok"/'; done"#;

fn sh_config(script: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        request_timeout: Duration::from_secs(5),
    }
}

fn state_for(config: ServerConfig) -> AppState {
    AppState::new(
        Arc::new(config),
        Arc::new(Metrics::new().unwrap()),
        Arc::new(ShutdownCoordinator::new()),
    )
}

/// Bind port 0, serve in the background, return the base URL.
async fn start(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_state = state.clone();
    tokio::spawn(async move {
        let _ = me_server::serve(listener, server_state).await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_http_post_bridges_request() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;

    let response = reqwest::Client::new()
        .post(format!("{}/mcp", base))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], json!(1));
    assert_eq!(body["result"], json!("ok"));
}

#[tokio::test]
async fn test_http_post_malformed_body_gets_error_envelope() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;

    let response = reqwest::Client::new()
        .post(format!("{}/mcp", base))
        .body("this is not json")
        .send()
        .await
        .unwrap();
    // Never a bare 5xx: the error rides a JSON-RPC envelope.
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], Value::Null);
    assert_eq!(body["error"]["code"], json!(-32603));
}

#[tokio::test]
async fn test_http_post_spawn_failure_keeps_original_id() {
    let mut config = sh_config(ECHO_SCRIPT);
    config.command = "/nonexistent-mcp-server".to_string();
    config.args = Vec::new();
    let base = start(state_for(config)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/mcp", base))
        .json(&json!({"jsonrpc": "2.0", "id": "req-9", "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], json!("req-9"));
    assert_eq!(body["error"]["code"], json!(-32603));
}

#[tokio::test]
async fn test_http_post_timeout_gets_error_envelope() {
    let mut config = sh_config("while read line; do :; done");
    config.request_timeout = Duration::from_millis(100);
    let base = start(state_for(config)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/mcp", base))
        .json(&json!({"jsonrpc": "2.0", "id": 4, "method": "slow"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], json!(4));
    assert_eq!(body["error"]["code"], json!(-32603));
}

#[tokio::test]
async fn test_healthz_always_ok() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;
    let response = reqwest::get(format!("{}/healthz", base)).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_ready_follows_alive_probe() {
    let state =
        state_for(sh_config(ECHO_SCRIPT)).with_alive_probe(Arc::new(|| false));
    let base = start(state).await;

    let response = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(response.status(), 503);
    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), 503);

    let state = state_for(sh_config(ECHO_SCRIPT)).with_alive_probe(Arc::new(|| true));
    let base = start(state).await;
    let response = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_ready_default_probe_resolves_command() {
    // No bridge has run yet; readiness falls back to resolving the command.
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;
    let response = reqwest::get(format!("{}/ready", base)).await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_metrics_after_traffic() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;

    reqwest::Client::new()
        .post(format!("{}/mcp", base))
        .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .send()
        .await
        .unwrap();

    let text = reqwest::get(format!("{}/metrics", base))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("mcp_requests_total"));
    assert!(text.contains(r#"method="tools/list""#));
    assert!(text.contains("mcp_request_duration_seconds"));
}

async fn ws_connect(
    base: &str,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("{}/mcp/stream", base.replacen("http", "ws", 1));
    let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
}

#[tokio::test]
async fn test_ws_request_response() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;
    let mut socket = ws_connect(&base).await;

    socket
        .send(WsMessage::Text(
            json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string(),
        ))
        .await
        .unwrap();

    let msg = socket.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(body["id"], json!(7));
    assert_eq!(body["result"], json!("ok"));

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_ws_out_of_order_responses() {
    // The process answers 2, then 1, then 3; clients still see each id's
    // own result.
    let script = concat!(
        "read a; read b; read c; ",
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":"two"}'; "#,
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":"one"}'; "#,
        r#"printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":"three"}'; "#,
        "while read x; do :; done",
    );
    let base = start(state_for(sh_config(script))).await;
    let mut socket = ws_connect(&base).await;

    for i in 1..=3u64 {
        socket
            .send(WsMessage::Text(
                json!({"jsonrpc": "2.0", "id": i, "method": "call"}).to_string(),
            ))
            .await
            .unwrap();
    }

    let mut seen = std::collections::HashMap::new();
    for _ in 0..3 {
        let msg = socket.next().await.unwrap().unwrap();
        let body: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        seen.insert(
            body["id"].as_u64().unwrap(),
            body["result"].as_str().unwrap().to_string(),
        );
    }
    assert_eq!(seen[&1], "one");
    assert_eq!(seen[&2], "two");
    assert_eq!(seen[&3], "three");

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_ws_malformed_message_gets_error_and_session_survives() {
    let base = start(state_for(sh_config(ECHO_SCRIPT))).await;
    let mut socket = ws_connect(&base).await;

    socket
        .send(WsMessage::Text("garbage".to_string()))
        .await
        .unwrap();
    let msg = socket.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(body["error"]["code"], json!(-32603));
    assert_eq!(body["id"], Value::Null);

    // A valid request on the same socket still works.
    socket
        .send(WsMessage::Text(
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
        ))
        .await
        .unwrap();
    let msg = socket.next().await.unwrap().unwrap();
    let body: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
    assert_eq!(body["result"], json!("ok"));

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_ws_server_shutdown_sends_going_away_to_all_sessions() {
    let state = state_for(sh_config(ECHO_SCRIPT));
    let base = start(state.clone()).await;
    let mut first = ws_connect(&base).await;
    let mut second = ws_connect(&base).await;

    state.shutdown.trigger("SIGTERM");
    // A second signal during shutdown must be a no-op.
    state.shutdown.trigger("SIGTERM");

    for socket in [&mut first, &mut second] {
        loop {
            match socket.next().await {
                Some(Ok(WsMessage::Close(Some(frame)))) => {
                    assert_eq!(frame.code, CloseCode::Away);
                    break;
                }
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {:?}", other),
            }
        }
    }
}

#[tokio::test]
async fn test_ws_process_death_sends_internal_error_close() {
    // Process exits immediately; the liveness check closes the socket.
    let base = start(state_for(sh_config("true"))).await;
    let mut socket = ws_connect(&base).await;

    let close = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match socket.next().await {
                Some(Ok(WsMessage::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {:?}", other),
            }
        }
    })
    .await
    .expect("liveness check never closed the socket");

    assert_eq!(close.unwrap().code, CloseCode::Error);
}
