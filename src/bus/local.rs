//! In-process broker
//!
//! One tokio broadcast channel per topic. Publishing to a topic nobody listens
//! on drops the payload, same as [`RedisBroker`](super::RedisBroker). Used
//! when the feed and the scanner share a process (`bus.backend = "local"`).

use super::{BusError, Broker, BrokerConnection};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug)]
struct Shared {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
    online: AtomicBool,
    /// Bumped to invalidate every open connection
    generation: AtomicU64,
    connects: AtomicUsize,
}

/// Broker living inside this process
#[derive(Debug, Clone)]
pub struct LocalBroker {
    shared: Arc<Shared>,
}

impl LocalBroker {
    /// Create a broker whose channels buffer `capacity` messages per subscriber
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                online: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                connects: AtomicUsize::new(0),
            }),
        }
    }

    /// Take the broker offline (or back online); offline refuses connections
    #[cfg(test)]
    pub(crate) fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::SeqCst);
    }

    /// Drop every open connection; clients must reconnect
    #[cfg(test)]
    pub(crate) fn disconnect_all(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of successful connects so far
    pub fn connection_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Current subscriber count on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.shared
            .channels
            .read()
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        if !self.shared.online.load(Ordering::SeqCst) {
            return Err(BusError::Connection("broker offline".into()));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(LocalConnection {
            shared: Arc::clone(&self.shared),
            generation: self.shared.generation.load(Ordering::SeqCst),
            open: AtomicBool::new(true),
        }))
    }
}

/// Connection handle onto a [`LocalBroker`]
#[derive(Debug)]
struct LocalConnection {
    shared: Arc<Shared>,
    generation: u64,
    open: AtomicBool,
}

impl LocalConnection {
    fn check_alive(&self) -> Result<(), BusError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(BusError::Connection("connection closed".into()));
        }
        if !self.shared.online.load(Ordering::SeqCst)
            || self.shared.generation.load(Ordering::SeqCst) != self.generation
        {
            return Err(BusError::Connection("connection lost".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for LocalConnection {
    async fn ping(&self) -> Result<(), BusError> {
        self.check_alive()
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        self.check_alive()?;
        let channels = self.shared.channels.read();
        match channels.get(channel) {
            // Err means no live receivers: the message is simply lost
            Some(tx) => Ok(tx.send(payload).unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BusError> {
        self.check_alive()?;
        let mut channels = self.shared.channels.write();
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.shared.capacity).0);
        Ok(tx.subscribe())
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
