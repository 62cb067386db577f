//! Configuration types for momentum-scanner
//!
//! Loaded from TOML; every section has defaults so a partial (or missing) file
//! still yields a runnable configuration. The API credential normally comes
//! from the environment.

use crate::bus::BusBackend;
use crate::feed::{Backoff, ReconnectPolicy};
use crate::momentum::{MomentumConfig, TargetWindow};
use crate::telemetry::LogFormat;
use crate::ws::WsConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the feed API key
pub const API_KEY_ENV: &str = "POLYGON_API_KEY";
/// Comma-separated ticker list override
pub const TICKERS_ENV: &str = "SCANNER_TICKERS";
/// Log level override
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("POLYGON_API_KEY is not set")]
    MissingCredential,
    #[error("base price for {symbol} must be positive, got {price}")]
    InvalidBasePrice { symbol: String, price: Decimal },
    #[error("history window must be at least 1")]
    InvalidHistoryWindow,
    #[error("invalid target window: {0}")]
    InvalidTargetWindow(String),
    #[error("reconnect attempts must be at least 1")]
    InvalidReconnectAttempts,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("invalid broker address {host:?}:{port}")]
    InvalidBusAddress { host: String, port: u16 },
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Market-data feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// WebSocket endpoint
    pub url: String,
    /// API key; usually supplied via `POLYGON_API_KEY` instead
    pub api_key: Option<String>,
    /// Tickers to subscribe (the reference symbol is always added)
    pub tickers: Vec<String>,
    /// Delay before each reconnection attempt (seconds)
    pub reconnect_delay_secs: u64,
    /// Reconnections tried after a failure before the connector gives up
    pub max_reconnect_attempts: u32,
    pub backoff: Backoff,
    /// Ceiling for exponential backoff (seconds)
    pub max_reconnect_delay_secs: u64,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://socket.polygon.io/stocks".to_string(),
            api_key: None,
            tickers: ["AAPL", "MSFT", "NVDA", "TSLA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reconnect_delay_secs: 5,
            max_reconnect_attempts: 5,
            backoff: Backoff::Fixed,
            max_reconnect_delay_secs: 60,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_secs(self.reconnect_delay_secs),
            max_attempts: self.max_reconnect_attempts,
            backoff: self.backoff,
            max_delay: Duration::from_secs(self.max_reconnect_delay_secs),
        }
    }

    pub fn ws_config(&self) -> WsConfig {
        WsConfig::new(&self.url)
            .ping_interval(Duration::from_secs(self.ping_interval_secs))
            .pong_timeout(Duration::from_secs(self.pong_timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

/// Distribution bus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub backend: BusBackend,
    /// Broker host (Redis backend)
    pub host: String,
    /// Broker port (Redis backend)
    pub port: u16,
    /// Bound on broker connects and round trips (milliseconds)
    pub timeout_ms: u64,
    /// Per-channel buffer; slower subscribers lag past this
    pub capacity: usize,
    /// Attempts when (re)establishing the broker connection
    pub max_retries: u32,
    /// Base of the exponential reconnect backoff (milliseconds)
    pub retry_base_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            backend: BusBackend::Redis,
            host: "localhost".to_string(),
            port: 6379,
            timeout_ms: 5000,
            capacity: 1024,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl BusConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Momentum scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Benchmark symbol used for relative strength
    pub reference_symbol: String,
    /// Minimum relative strength, in percentage points
    pub momentum_threshold: Decimal,
    /// Minimum trade size
    pub volume_threshold: u64,
    /// Ticks of history compared against the current price
    pub history_window: usize,
    /// UTC hour of the entry window
    pub target_hour: u32,
    pub target_minute_start: u32,
    pub target_minute_end: u32,
    /// Anchor prices for return calculations
    pub base_prices: BTreeMap<String, Decimal>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let base_prices = [
            ("SPY", Decimal::new(530, 0)),
            ("AAPL", Decimal::new(185, 0)),
            ("MSFT", Decimal::new(430, 0)),
            ("NVDA", Decimal::new(1100, 0)),
            ("TSLA", Decimal::new(185, 0)),
        ]
        .into_iter()
        .map(|(s, p)| (s.to_string(), p))
        .collect();

        Self {
            reference_symbol: "SPY".to_string(),
            momentum_threshold: Decimal::new(15, 1), // 1.5 points
            volume_threshold: 1000,
            history_window: 5,
            target_hour: 15,
            target_minute_start: 45,
            target_minute_end: 59,
            base_prices,
        }
    }
}

impl ScannerConfig {
    /// Canonical (upper-case) reference symbol
    pub fn reference(&self) -> String {
        self.reference_symbol.trim().to_uppercase()
    }

    pub fn momentum(&self) -> MomentumConfig {
        MomentumConfig {
            momentum_threshold: self.momentum_threshold,
            volume_threshold: self.volume_threshold,
            history_window: self.history_window,
            target_window: TargetWindow {
                hour: self.target_hour,
                minute_start: self.target_minute_start,
                minute_end: self.target_minute_end,
            },
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.feed.api_key = Some(key.trim().to_string());
        }
        if let Some(tickers) = lookup(TICKERS_ENV) {
            let parsed: Vec<String> = tickers
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.feed.tickers = parsed;
            }
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|l| !l.trim().is_empty()) {
            self.telemetry.log_level = level;
        }
    }

    /// The feed credential, required to run
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.feed
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential)
    }

    /// Symbols the feed subscribes to: tracked tickers plus the reference symbol
    pub fn feed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::new();
        let reference = self.scanner.reference();
        for symbol in self
            .feed
            .tickers
            .iter()
            .map(|s| s.trim().to_uppercase())
            .chain(std::iter::once(reference))
        {
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        symbols
    }

    /// Check everything needed to start the pipeline
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_key()?;

        if self.feed.max_reconnect_attempts == 0 {
            return Err(ConfigError::InvalidReconnectAttempts);
        }
        for (name, value) in [
            ("feed.ping_interval_secs", self.feed.ping_interval_secs),
            ("feed.pong_timeout_secs", self.feed.pong_timeout_secs),
            ("feed.connect_timeout_secs", self.feed.connect_timeout_secs),
            ("bus.timeout_ms", self.bus.timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.bus.backend == BusBackend::Redis && (self.bus.host.trim().is_empty() || self.bus.port == 0) {
            return Err(ConfigError::InvalidBusAddress {
                host: self.bus.host.clone(),
                port: self.bus.port,
            });
        }

        let scanner = &self.scanner;
        if scanner.history_window == 0 {
            return Err(ConfigError::InvalidHistoryWindow);
        }
        if scanner.target_hour > 23 {
            return Err(ConfigError::InvalidTargetWindow(format!(
                "hour {} out of range",
                scanner.target_hour
            )));
        }
        if scanner.target_minute_end > 59 || scanner.target_minute_start > scanner.target_minute_end {
            return Err(ConfigError::InvalidTargetWindow(format!(
                "minutes {}..={} out of range",
                scanner.target_minute_start, scanner.target_minute_end
            )));
        }
        for (symbol, price) in &scanner.base_prices {
            if *price <= Decimal::ZERO {
                return Err(ConfigError::InvalidBasePrice {
                    symbol: symbol.clone(),
                    price: *price,
                });
            }
        }
        Ok(())
    }

    /// Copy safe to print: the credential is masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.feed.api_key.is_some() {
            copy.feed.api_key = Some("********".to_string());
        }
        copy
    }
}
