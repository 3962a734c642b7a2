//! Prometheus metrics for the wrapper.
//!
//! One `Metrics` instance is constructed at startup with its own registry
//! and passed by `Arc` into every component that records a measurement; no
//! hidden global registry.

use me_types::{AppError, AppResult};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    /// `mcp_requests_total{method,status}`
    pub requests_total: IntCounterVec,

    /// `mcp_request_duration_seconds{method}`
    pub request_duration_seconds: HistogramVec,

    /// `mcp_active_connections`
    pub active_connections: IntGauge,

    /// `mcp_errors_total{type}`
    pub errors_total: IntCounterVec,

    /// `mcp_bridge_restarts_total`
    pub bridge_restarts_total: IntCounter,
}

impl Metrics {
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("mcp_requests_total", "JSON-RPC requests by method and status"),
            &["method", "status"],
        )
        .map_err(|e| AppError::Config(format!("Failed to create metric: {}", e)))?;

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mcp_request_duration_seconds",
                "JSON-RPC request duration by method",
            ),
            &["method"],
        )
        .map_err(|e| AppError::Config(format!("Failed to create metric: {}", e)))?;

        let active_connections = IntGauge::new(
            "mcp_active_connections",
            "Currently open WebSocket connections",
        )
        .map_err(|e| AppError::Config(format!("Failed to create metric: {}", e)))?;

        let errors_total = IntCounterVec::new(
            Opts::new("mcp_errors_total", "Bridge errors by type"),
            &["type"],
        )
        .map_err(|e| AppError::Config(format!("Failed to create metric: {}", e)))?;

        let bridge_restarts_total = IntCounter::new(
            "mcp_bridge_restarts_total",
            "Managed process respawns since startup",
        )
        .map_err(|e| AppError::Config(format!("Failed to create metric: {}", e)))?;

        for collector in [
            Box::new(requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(request_duration_seconds.clone()),
            Box::new(active_connections.clone()),
            Box::new(errors_total.clone()),
            Box::new(bridge_restarts_total.clone()),
        ] {
            registry
                .register(collector)
                .map_err(|e| AppError::Config(format!("Failed to register metric: {}", e)))?;
        }

        Ok(Self {
            registry,
            requests_total,
            request_duration_seconds,
            active_connections,
            errors_total,
            bridge_restarts_total,
        })
    }

    /// Record one settled request.
    pub fn observe_request(&self, method: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.requests_total
            .with_label_values(&[method, status])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    /// Record one classified error.
    pub fn observe_error(&self, error_type: &str) {
        self.errors_total.with_label_values(&[error_type]).inc();
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
