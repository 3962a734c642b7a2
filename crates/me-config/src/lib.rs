//! Configuration management module
//!
//! Two independent configuration surfaces live here:
//! - [`ServerConfig`]: wrapper-side settings, loaded once from environment
//!   variables at startup.
//! - [`ClientConfigStore`]: connector-side settings (base URL, API keys),
//!   loaded from the first existing JSON file among an ordered candidate
//!   list. A missing or unparseable file degrades to an empty config.

pub mod client;
pub mod paths;
pub mod server;

pub use client::{ClientConfig, ClientConfigStore};
pub use server::ServerConfig;
