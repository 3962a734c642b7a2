//! Shared server state.

use crate::metrics::Metrics;
use crate::shutdown::ShutdownCoordinator;
use me_bridge::ProcessBridge;
use me_config::ServerConfig;
use me_types::AppResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Injectable "is the managed process alive" predicate used by `/health`
/// and `/ready`.
pub type AliveProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub metrics: Arc<Metrics>,
    pub shutdown: Arc<ShutdownCoordinator>,

    /// Weak handles to every bridge spawned and not yet dropped; pruned on
    /// read. Feeds the default alive probe.
    bridges: Arc<RwLock<Vec<Weak<ProcessBridge>>>>,

    /// Total bridges spawned; spawns after the first count as restarts.
    spawn_count: Arc<AtomicU64>,

    alive_probe: Option<AliveProbe>,
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        metrics: Arc<Metrics>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            config,
            metrics,
            shutdown,
            bridges: Arc::new(RwLock::new(Vec::new())),
            spawn_count: Arc::new(AtomicU64::new(0)),
            alive_probe: None,
        }
    }

    /// Override the process-alive predicate (tests, embedders).
    pub fn with_alive_probe(mut self, probe: AliveProbe) -> Self {
        self.alive_probe = Some(probe);
        self
    }

    /// Spawn a bridge for the configured command and track it.
    pub async fn spawn_bridge(&self) -> AppResult<Arc<ProcessBridge>> {
        let bridge = ProcessBridge::spawn(
            &self.config.command,
            &self.config.args,
            HashMap::new(),
            self.config.request_timeout,
        )
        .await?;
        let bridge = Arc::new(bridge);

        if self.spawn_count.fetch_add(1, Ordering::SeqCst) > 0 {
            self.metrics.bridge_restarts_total.inc();
        }

        let mut bridges = self.bridges.write();
        bridges.retain(|weak| weak.strong_count() > 0);
        bridges.push(Arc::downgrade(&bridge));

        Ok(bridge)
    }

    /// Whether the managed process is considered alive.
    ///
    /// With no explicit probe: true if any tracked bridge's process is
    /// running, or — when nothing is running — if the configured command
    /// resolves on PATH (the wrapper could serve the next request).
    pub fn process_alive(&self) -> bool {
        if let Some(probe) = &self.alive_probe {
            return probe();
        }

        let bridges: Vec<Arc<ProcessBridge>> = {
            let mut guard = self.bridges.write();
            guard.retain(|weak| weak.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        if !bridges.is_empty() {
            return bridges.iter().any(|bridge| bridge.is_alive());
        }

        which::which(&self.config.command).is_ok()
    }
}
