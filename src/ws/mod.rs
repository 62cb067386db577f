//! WebSocket transport
//!
//! A thin session over tokio-tungstenite with ping/pong keepalive. The feed
//! connector layers authentication, subscription and reconnection on top.

mod client;
mod types;

pub use client::WsSession;
pub use types::{WsConfig, WsError};
