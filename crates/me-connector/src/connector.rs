//! The stdin → remote → stdout loop.

use me_bridge::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use me_types::AppResult;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::http::HttpForwarder;
use crate::ws::WsForwarder;

/// The connector's remote leg: one HTTP request per call, or one shared
/// WebSocket.
pub enum Transport {
    Http(HttpForwarder),
    Ws(WsForwarder),
}

impl Transport {
    pub async fn forward(&self, request: JsonRpcRequest) -> AppResult<JsonRpcResponse> {
        match self {
            Transport::Http(forwarder) => forwarder.forward(&request).await,
            Transport::Ws(forwarder) => forwarder.forward(request).await,
        }
    }

    pub async fn close(&self) {
        if let Transport::Ws(forwarder) = self {
            forwarder.close().await;
        }
    }
}

pub struct Connector {
    transport: Arc<Transport>,
}

impl Connector {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Read newline-delimited requests from `reader` until EOF, writing one
    /// response line per request to `writer`.
    ///
    /// Each line is forwarded from its own task, so a slow request never
    /// holds up the ones behind it; responses are written in settle order,
    /// serialized through one channel (the same shape as the wrapper's
    /// WebSocket send path). Blank lines are skipped. A line that is not
    /// valid JSON-RPC yields a -32000 error envelope with a null id and the
    /// loop keeps running; a forwarding failure yields a -32603 envelope
    /// carrying the request's original id. Nothing but responses is ever
    /// written.
    pub async fn run<R, W>(&self, reader: R, writer: &mut W) -> AppResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Connector started, reading from stdin");

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut tx = Some(tx);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                result = lines.next_line(), if tx.is_some() => {
                    match result {
                        Ok(Some(raw)) => {
                            let trimmed = raw.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            if let Some(tx) = &tx {
                                self.spawn_request(trimmed.to_string(), tx.clone());
                            }
                        }
                        Ok(None) => {
                            debug!("EOF on stdin, draining in-flight requests");
                            // Dropping our sender lets rx run dry once every
                            // request task has settled.
                            tx = None;
                        }
                        Err(e) => {
                            error!("Failed to read from stdin: {}", e);
                            return Err(e.into());
                        }
                    }
                }
                maybe_json = rx.recv() => {
                    match maybe_json {
                        Some(json) => {
                            writer.write_all(json.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                            writer.flush().await?;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(())
    }

    /// Forward one input line without blocking the read loop; the response
    /// line goes back through the shared channel.
    fn spawn_request(&self, raw: String, tx: mpsc::UnboundedSender<String>) {
        let transport = self.transport.clone();
        tokio::spawn(async move {
            let response = match serde_json::from_str::<JsonRpcRequest>(&raw) {
                Ok(request) => {
                    debug!("Forwarding request: method={}", request.method);
                    let original_id = request.id.clone().unwrap_or(Value::Null);
                    match transport.forward(request).await {
                        Ok(response) => response,
                        Err(e) => {
                            error!("Request forwarding failed: {}", e);
                            JsonRpcResponse::error(
                                original_id,
                                JsonRpcError::internal_error(format!("Internal error: {}", e)),
                            )
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to parse request line: {}", e);
                    JsonRpcResponse::error(
                        Value::Null,
                        JsonRpcError::bridge_error(format!("Invalid request: {}", e)),
                    )
                }
            };

            match serde_json::to_string(&response) {
                Ok(json) => {
                    let _ = tx.send(json);
                }
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                }
            }
        });
    }

    /// Tear down the remote leg.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}
