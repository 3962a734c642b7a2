//! Stdio ↔ network bridging primitives for MCPEverything.
//!
//! The pieces stack bottom-up:
//! - [`codec::FrameCodec`] turns arbitrary byte chunks into parsed
//!   newline-delimited JSON frames.
//! - [`correlator::RequestCorrelator`] matches asynchronously arriving
//!   responses back to pending requests by id, with per-request timeouts.
//! - [`process::ProcessBridge`] owns one spawned MCP process and wires its
//!   stdout through the codec into the correlator.

pub mod codec;
pub mod correlator;
pub mod process;
pub mod protocol;

pub use codec::FrameCodec;
pub use correlator::RequestCorrelator;
pub use process::ProcessBridge;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
