//! Shutdown coordination.
//!
//! One `ShutdownCoordinator` per process. `trigger` runs the shutdown
//! sequence exactly once: broadcast a close to live WebSocket handlers
//! (they send close-code 1001), then cancel the accept loop's token so the
//! listener stops and in-flight HTTP requests drain. A second trigger while
//! shutdown is in progress is logged and ignored.
//!
//! OS signals are wired up by [`listen_for_signals`], the only
//! platform-specific adapter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct ShutdownCoordinator {
    token: CancellationToken,
    ws_close: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (ws_close, _) = broadcast::channel(1);
        Self {
            token: CancellationToken::new(),
            ws_close,
            triggered: AtomicBool::new(false),
        }
    }

    /// Token cancelled when shutdown begins; drives axum's graceful
    /// shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Subscribe to the WebSocket close broadcast. Each live connection
    /// handler holds one receiver and sends close-code 1001 when it fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.ws_close.subscribe()
    }

    /// Run the shutdown sequence. Idempotent: only the first call acts.
    pub fn trigger(&self, signal: &str) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            warn!("Received {} while shutdown already in progress, ignoring", signal);
            return;
        }
        info!("Received {}, shutting down", signal);

        // Order matters: sockets get their close frame before the listener
        // goes away.
        let _ = self.ws_close.send(());
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Platform adapter: forward SIGINT/SIGTERM to the coordinator. Keeps
/// listening so repeated signals are observed (and logged as ignored).
pub fn listen_for_signals(coordinator: Arc<ShutdownCoordinator>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if result.is_err() {
                            return;
                        }
                        coordinator.trigger("SIGINT");
                    }
                    _ = sigterm.recv() => {
                        coordinator.trigger("SIGTERM");
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                coordinator.trigger("SIGINT");
            }
        }
    });
}
