//! WebSocket client library
//!
//! Provides a reusable WebSocket client with automatic reconnection,
//! ping/pong handling, and jittered exponential backoff.

mod backoff;
mod client;
mod types;

pub use backoff::Backoff;
pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
