//! Persistent WebSocket forwarding.
//!
//! One socket to `{ws_base}/{target_id}/stream` is opened on first use and
//! reused for every subsequent request. Responses arrive in whatever order
//! the remote settles them; a `RequestCorrelator` matches them back by id.
//! If the socket drops, in-flight requests are rejected and the next
//! request reconnects.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use me_bridge::{JsonRpcRequest, JsonRpcResponse, RequestCorrelator};
use me_types::{AppError, AppResult};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long one request may wait for its correlated response.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

struct Session {
    sink: WsSink,
    correlator: RequestCorrelator,
    reader: JoinHandle<()>,
}

pub struct WsForwarder {
    url: String,
    api_key: Option<String>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl WsForwarder {
    /// `base_url` is the HTTP base; the scheme is rewritten to ws/wss.
    pub fn new(base_url: &str, target_id: &str, api_key: Option<String>) -> Self {
        let ws_base = base_url.trim_end_matches('/').replacen("http", "ws", 1);
        Self {
            url: format!("{}/{}/stream", ws_base, target_id),
            api_key,
            session: tokio::sync::Mutex::new(None),
        }
    }

    async fn connect(&self) -> AppResult<Session> {
        let mut handshake = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::Config(format!("Invalid WebSocket URL {}: {}", self.url, e)))?;
        if let Some(key) = &self.api_key {
            let value = format!("Bearer {}", key)
                .parse()
                .map_err(|_| AppError::Config("API key is not a valid header value".to_string()))?;
            handshake.headers_mut().insert("Authorization", value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(handshake)
            .await
            .map_err(|e| {
                AppError::Transport(format!("Failed to connect to {}: {}", self.url, e))
            })?;
        info!("Connected to {}", self.url);

        let (sink, mut read) = stream.split();
        let correlator = RequestCorrelator::new();
        let reader_correlator = correlator.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<JsonRpcResponse>(&text) {
                            Ok(response) => {
                                let id = response.id.clone();
                                reader_correlator.settle(&id, response);
                            }
                            Err(e) => {
                                warn!("Discarding unparseable frame from remote: {}", e);
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!("Remote closed the stream: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
            reader_correlator.reject_all("Connection to remote closed");
        });

        Ok(Session {
            sink,
            correlator,
            reader,
        })
    }

    /// Send one request over the shared socket and await its response.
    ///
    /// Requests without a usable id get a generated correlation id which is
    /// stripped back out of the response before it reaches the caller.
    pub async fn forward(&self, mut request: JsonRpcRequest) -> AppResult<JsonRpcResponse> {
        let original_id = request.id.clone();
        let generated = !request.has_id();
        if generated {
            request.id = Some(Value::String(Uuid::new_v4().to_string()));
        }
        let correlation_id = request.id.clone().unwrap_or(Value::Null);

        let rx = {
            let mut guard = self.session.lock().await;
            if guard.as_ref().map_or(true, |s| s.reader.is_finished()) {
                *guard = Some(self.connect().await?);
            }
            let session = guard
                .as_mut()
                .ok_or_else(|| AppError::Transport("No active connection".to_string()))?;

            let rx = session.correlator.register(&correlation_id, REQUEST_TIMEOUT);
            let text = serde_json::to_string(&request)
                .inspect_err(|_| session.correlator.fail(&correlation_id, AppError::Protocol(
                    "Failed to serialize request".to_string(),
                )))?;
            if let Err(e) = session.sink.send(Message::Text(text)).await {
                let error = AppError::Transport(format!("Failed to send request: {}", e));
                session
                    .correlator
                    .fail(&correlation_id, AppError::Transport(format!(
                        "Failed to send request: {}",
                        e
                    )));
                // The socket is unusable; drop it so the next request
                // reconnects.
                *guard = None;
                return Err(error);
            }
            rx
        };

        let mut response = rx
            .await
            .map_err(|_| AppError::Transport("Request cancelled".to_string()))??;
        if generated {
            response.id = original_id.unwrap_or(Value::Null);
        }
        Ok(response)
    }

    /// Close the socket if one is open. In-flight requests are rejected.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.correlator.reject_all("Connector shutting down");
            let _ = session.sink.send(Message::Close(None)).await;
            // The reader ends on its own once the close completes.
        }
    }
}
