//! WebSocket types and configuration

use std::time::Duration;
use thiserror::Error;

/// WebSocket session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL to connect to
    pub url: String,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// How long to wait for the pong before declaring the peer dead
    pub pong_timeout: Duration,
    /// Bound on the TCP/TLS/upgrade handshake
    pub connect_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl WsConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Set pong timeout
    pub fn pong_timeout(mut self, d: Duration) -> Self {
        self.pong_timeout = d;
        self
    }

    /// Set handshake timeout
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }
}

/// WebSocket errors
#[derive(Debug, Clone, Error)]
pub enum WsError {
    /// Connection could not be established or broke mid-stream
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// Peer did not answer a ping in time
    #[error("Pong not received within {0:?}")]
    PongTimeout(Duration),
    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),
}
