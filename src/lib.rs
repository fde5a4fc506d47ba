//! Table chat live-update channel
//!
//! Keeps a restaurant table's chat view current: a WebSocket live channel,
//! an HTTP poller as fallback, and a supervisor that switches between them.
//! - `core`: platform-agnostic events, supervisor and poller bookkeeping
//! - `page` (wasm): browser driver rendering into the chat page DOM
//! - `runtime_native` (cli): tokio driver used by the terminal client

pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod time;

#[cfg(feature = "cli")]
pub mod runtime_native;
#[cfg(feature = "cli")]
pub mod session;
#[cfg(feature = "cli")]
pub mod terminal;
#[cfg(feature = "cli")]
pub mod websocket_native;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
mod page;
#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod websocket_wasm;
