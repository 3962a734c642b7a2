//! Stdio ↔ remote bridge for hosted MCP instances.
//!
//! The `connector` binary is what a desktop MCP client launches as a
//! "local" server: it reads JSON-RPC requests line-by-line from stdin,
//! forwards each to a hosted instance over HTTP (default) or one shared
//! WebSocket (`--ws`), and writes responses back to stdout. Logs go to
//! stderr only; stdout carries nothing but protocol traffic.

pub mod auth;
pub mod connector;
pub mod http;
pub mod ws;

/// Public endpoint used when neither the CLI nor the config file names one.
pub const DEFAULT_BASE_URL: &str = "https://api.mcpeverything.com";

pub use connector::{Connector, Transport};
pub use http::HttpForwarder;
pub use ws::WsForwarder;
