//! Bus types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which broker carries the ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// Redis pub/sub at `bus.host:bus.port`; feed and scanner may run apart
    #[default]
    Redis,
    /// In-process channels; feed and scanner share one process
    Local,
}

/// Channel name for a symbol: `tick:<symbol-lowercased>`
pub fn channel_name(symbol: &str) -> String {
    format!("tick:{}", symbol.trim().to_lowercase())
}

/// Distribution bus errors
#[derive(Debug, Error)]
pub enum BusError {
    /// Broker unreachable or connection dropped
    #[error("broker connection failed: {0}")]
    Connection(String),
    /// Tick could not be encoded
    #[error("failed to serialize tick: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Broker rejected the publish
    #[error("publish to {channel} failed: {reason}")]
    Publish { channel: String, reason: String },
}
