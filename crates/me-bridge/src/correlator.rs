//! Request/response correlation by JSON-RPC id.
//!
//! Every path that settles an id removes it from the pending map before the
//! continuation is invoked, so double-settlement is structurally impossible:
//! the oneshot sender only exists outside the map in the hands of exactly
//! one settling path.

use crate::protocol::JsonRpcResponse;
use me_types::{AppError, AppResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Normalize a JSON-RPC id for pending map lookup.
///
/// Handles the case where a peer returns `id: null` by converting to a
/// special key. String ids are quoted so `1` and `"1"` stay distinct.
pub fn normalize_response_id(id: &Value) -> String {
    match id {
        Value::Null => "__null_id__".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s),
        _ => id.to_string(),
    }
}

/// One outstanding request: its continuation plus the timeout timer that
/// rejects it if no response arrives in time.
struct PendingRequest {
    tx: oneshot::Sender<AppResult<JsonRpcResponse>>,
    timer: JoinHandle<()>,
}

/// Maps each in-flight request id to its pending continuation.
///
/// Clone-cheap; all clones share one pending map.
#[derive(Clone, Default)]
pub struct RequestCorrelator {
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request id and arm its timeout.
    ///
    /// The returned receiver resolves exactly once: with the matched
    /// response, a timeout error, or the error passed to
    /// [`reject_all`](Self::reject_all)/[`fail`](Self::fail).
    pub fn register(
        &self,
        id: &Value,
        timeout: Duration,
    ) -> oneshot::Receiver<AppResult<JsonRpcResponse>> {
        let key = normalize_response_id(id);
        let (tx, rx) = oneshot::channel();

        // The lock is held across the spawn so the timer cannot observe the
        // map before the entry is inserted, even with a zero timeout.
        let mut pending = self.pending.lock();
        let timer = {
            let pending = self.pending.clone();
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(entry) = pending.lock().remove(&key) {
                    let _ = entry.tx.send(Err(AppError::Timeout(format!(
                        "No response for request {} within {:?}",
                        key, timeout
                    ))));
                }
            })
        };
        if let Some(stale) = pending.insert(key, PendingRequest { tx, timer }) {
            // Duplicate id while the first is still in flight; the older
            // continuation can no longer be answered.
            stale.timer.abort();
        }
        rx
    }

    /// Resolve the pending request matching `id` with `response`.
    ///
    /// A response for an unknown id is logged and otherwise ignored; a
    /// correlator never fails on a stray reply.
    pub fn settle(&self, id: &Value, response: JsonRpcResponse) {
        let key = normalize_response_id(id);
        match self.pending.lock().remove(&key) {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.tx.send(Ok(response));
            }
            None => {
                warn!("Received response for unknown request ID: {}", key);
            }
        }
    }

    /// Reject exactly the one pending request matching `id` with `error`.
    pub fn fail(&self, id: &Value, error: AppError) {
        let key = normalize_response_id(id);
        if let Some(entry) = self.pending.lock().remove(&key) {
            entry.timer.abort();
            let _ = entry.tx.send(Err(error));
        }
    }

    /// Reject every pending request with a process error built from
    /// `reason`, leaving the map empty.
    pub fn reject_all(&self, reason: &str) {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            entry.timer.abort();
            let _ = entry.tx.send(Err(AppError::Process(reason.to_string())));
        }
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
