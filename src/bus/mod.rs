//! Distribution bus
//!
//! Per-symbol publish/subscribe that decouples the feed from its consumers.
//! Delivery is at-most-once with fan-out to every live subscriber; ticks
//! published while nobody listens are lost.

mod local;
mod pubsub;
mod remote;
mod types;

pub use local::LocalBroker;
pub use pubsub::{TickBus, TickSubscription};
pub use remote::RedisBroker;
pub use types::{channel_name, BusBackend, BusError};

use crate::config::BusConfig;
use crate::feed::Tick;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A message broker that hands out connections
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BusError>;
}

/// One live connection to a broker
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Fails if the connection is no longer usable
    async fn ping(&self) -> Result<(), BusError>;

    /// Publish a text payload, returning the number of receivers
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError>;

    /// Subscribe to a channel
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BusError>;

    async fn close(&self);
}

/// Sink for ticks decoded by the feed connector
#[async_trait]
pub trait TickPublisher: Send + Sync {
    async fn publish_tick(&self, tick: &Tick) -> Result<usize, BusError>;
}

/// Build the broker selected by `config.backend`
pub fn broker_for(config: &BusConfig) -> Result<Arc<dyn Broker>, BusError> {
    match config.backend {
        BusBackend::Redis => {
            let broker = RedisBroker::new(&config.host, config.port, config.capacity)?
                .timeout(config.timeout());
            tracing::info!(address = %broker.address(), "Using Redis broker");
            Ok(Arc::new(broker))
        }
        BusBackend::Local => {
            tracing::info!("Using in-process broker");
            Ok(Arc::new(LocalBroker::new(config.capacity)))
        }
    }
}
