//! Shared error types for the MCPEverything transport bridge

pub mod errors;

pub use errors::{AppError, AppResult};
