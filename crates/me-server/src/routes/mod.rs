//! HTTP and WebSocket route handlers.

pub mod health;
pub mod mcp;
pub mod mcp_ws;
