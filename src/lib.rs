//! momentum-scanner: streaming momentum scanner for real-time trade ticks
//!
//! This library provides the core components for:
//! - Trade ticks from a Polygon-style WebSocket feed with reconnect/backoff
//! - Per-symbol publish/subscribe distribution
//! - Momentum evaluation against a reference symbol
//! - Orchestration of subscriptions and entry signals
//! - Full observability stack

pub mod bus;
pub mod cli;
pub mod config;
pub mod feed;
pub mod momentum;
pub mod scanner;
pub mod shutdown;
pub mod telemetry;
pub mod ws;
