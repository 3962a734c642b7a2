//! Process bridge: owns one spawned MCP process and carries JSON-RPC
//! request/response conversations over its stdio.
//!
//! A dedicated reader task owns the [`FrameCodec`] and pushes every parsed
//! frame into the [`RequestCorrelator`]; callers of
//! [`ProcessBridge::send_request`] never touch the output stream directly.

use crate::codec::FrameCodec;
use crate::correlator::RequestCorrelator;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use me_types::{AppError, AppResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a closed bridge waits for its process to exit before the kill
/// escalates. Independent of the per-request timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Bridge pairing one managed stdio process with any number of logical
/// request/response conversations.
///
/// State machine: `Starting → Running → Closed`. The transition to Closed
/// happens exactly once, triggered by `close()`, process exit, or a read
/// error; every pending request is rejected at that point.
pub struct ProcessBridge {
    command: String,

    /// Child process handle. Taken out by `close()` for kill escalation.
    child: Arc<RwLock<Option<Child>>>,

    /// Stdin handle for writing requests. Mutex so concurrent writers
    /// serialize whole lines.
    stdin: Arc<Mutex<Option<ChildStdin>>>,

    correlator: RequestCorrelator,

    /// Flips true exactly once.
    closed: Arc<AtomicBool>,

    request_timeout: Duration,
}

impl ProcessBridge {
    /// Spawn the managed process and start its reader task.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: HashMap<String, String>,
        request_timeout: Duration,
    ) -> AppResult<Self> {
        info!("Spawning MCP process: {} {:?}", command, args);

        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::Process(format!("Failed to spawn MCP process '{}': {}", command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Process("Failed to capture stdin of MCP process".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Process("Failed to capture stdout of MCP process".into()))?;

        let bridge = Self {
            command: command.to_string(),
            child: Arc::new(RwLock::new(Some(child))),
            stdin: Arc::new(Mutex::new(Some(stdin))),
            correlator: RequestCorrelator::new(),
            closed: Arc::new(AtomicBool::new(false)),
            request_timeout,
        };
        bridge.start_reader(stdout);
        Ok(bridge)
    }

    /// Reader task: drains the process's stdout through a frame codec and
    /// settles matching pending requests.
    fn start_reader(&self, stdout: ChildStdout) {
        let correlator = self.correlator.clone();
        let closed = self.closed.clone();
        let command = self.command.clone();

        tokio::spawn(async move {
            use tokio::io::AsyncReadExt;

            let mut stdout = stdout;
            let mut codec = FrameCodec::new();
            let mut buf = [0u8; 4096];

            let reason = loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => {
                        info!("MCP process '{}' stdout closed", command);
                        break format!("MCP process '{}' exited", command);
                    }
                    Ok(n) => {
                        for frame in codec.push(&buf[..n]) {
                            dispatch_frame(&correlator, frame);
                        }
                    }
                    Err(e) => {
                        warn!("Error reading from MCP process stdout: {}", e);
                        break format!("Error reading from MCP process '{}': {}", command, e);
                    }
                }
            };

            closed.store(true, Ordering::SeqCst);
            correlator.reject_all(&reason);
        });
    }

    /// Send one request and await its correlated response.
    ///
    /// A request without a usable id gets a generated correlation id which
    /// is stripped back out of the response before it reaches the caller.
    /// A stdin write failure fails only this request; the bridge stays up.
    pub async fn send_request(&self, mut request: JsonRpcRequest) -> AppResult<JsonRpcResponse> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Process("Bridge is not running".to_string()));
        }

        let original_id = request.id.clone();
        let generated = !request.has_id();
        if generated {
            request.id = Some(Value::String(Uuid::new_v4().to_string()));
        }
        let correlation_id = request.id.clone().unwrap_or(Value::Null);

        let rx = self.correlator.register(&correlation_id, self.request_timeout);

        let line = FrameCodec::encode(&request).inspect_err(|_| {
            self.correlator.fail(
                &correlation_id,
                AppError::Protocol("Failed to serialize request".to_string()),
            );
        })?;

        // A write failure settles exactly this request; the bridge itself
        // stays up until the process actually dies.
        {
            let mut stdin_guard = self.stdin.lock().await;
            let stdin = stdin_guard.as_mut().ok_or_else(|| {
                let err = AppError::Transport("Process stdin not available".to_string());
                self.correlator.fail(
                    &correlation_id,
                    AppError::Transport("Process stdin not available".to_string()),
                );
                err
            })?;

            let write_result = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await
            }
            .await;

            if let Err(e) = write_result {
                self.correlator.fail(
                    &correlation_id,
                    AppError::Transport(format!("Failed to write to process stdin: {}", e)),
                );
                return Err(AppError::Transport(format!(
                    "Failed to write to process stdin: {}",
                    e
                )));
            }
        }

        let mut response = rx
            .await
            .map_err(|_| AppError::Process("Request cancelled".to_string()))??;

        if generated {
            response.id = original_id.unwrap_or(Value::Null);
        }
        Ok(response)
    }

    /// Whether the managed process is still running.
    pub fn is_alive(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.child.write();
        match child.as_mut() {
            Some(process) => match process.try_wait() {
                Ok(Some(_status)) => false,
                Ok(None) => true,
                Err(e) => {
                    warn!("Error checking process status: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Close the bridge: reject all pending requests, signal the process to
    /// terminate by closing its stdin, and escalate to a forced kill if it
    /// has not exited after the grace period.
    ///
    /// Idempotent; closing an already-closed bridge is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Bridge already closed");
            return;
        }
        info!("Closing bridge for '{}'", self.command);

        self.correlator.reject_all("Bridge closed");

        // Dropping stdin is the termination signal: a line-oriented stdio
        // server exits when its input reaches EOF.
        {
            let mut stdin = self.stdin.lock().await;
            stdin.take();
        }

        let child = self.child.write().take();
        if let Some(mut process) = child {
            let command = self.command.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(KILL_GRACE, process.wait()).await {
                    Ok(Ok(status)) => {
                        debug!("MCP process '{}' exited with {}", command, status);
                    }
                    Ok(Err(e)) => {
                        warn!("Error waiting for MCP process '{}': {}", command, e);
                    }
                    Err(_) => {
                        warn!(
                            "MCP process '{}' did not exit within {:?}, killing",
                            command, KILL_GRACE
                        );
                        if let Err(e) = process.kill().await {
                            warn!("Failed to kill MCP process '{}': {}", command, e);
                        }
                    }
                }
            });
        }
    }
}

/// Route one decoded frame: responses settle their pending entry, anything
/// else is logged and dropped.
fn dispatch_frame(correlator: &RequestCorrelator, frame: Value) {
    let is_response = frame.get("result").is_some() || frame.get("error").is_some();
    if !is_response {
        debug!("Ignoring non-response frame from process: {}", frame);
        return;
    }
    match serde_json::from_value::<JsonRpcResponse>(frame) {
        Ok(response) => {
            let id = response.id.clone();
            correlator.settle(&id, response);
        }
        Err(e) => {
            warn!("Frame is not a valid JSON-RPC response: {}", e);
        }
    }
}
