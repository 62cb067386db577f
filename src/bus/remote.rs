//! Redis-backed broker
//!
//! Lets the feed connector and the scanner run as separate processes joined by
//! Redis PUBLISH/SUBSCRIBE. Delivery stays at-most-once: Redis does not queue
//! for absent subscribers either.

use super::{BusError, Broker, BrokerConnection};
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broker reached over the network
#[derive(Debug, Clone)]
pub struct RedisBroker {
    client: redis::Client,
    address: String,
    capacity: usize,
    timeout: Duration,
}

impl RedisBroker {
    /// Point at `host:port`; nothing is dialled until [`Broker::connect`]
    pub fn new(host: &str, port: u16, capacity: usize) -> Result<Self, BusError> {
        let address = format!("{}:{}", host.trim(), port);
        let client = redis::Client::open(format!("redis://{}/", address))
            .map_err(|e| BusError::Connection(format!("invalid broker address {}: {}", address, e)))?;
        Ok(Self {
            client,
            address,
            capacity: capacity.max(1),
            timeout: Duration::from_secs(5),
        })
    }

    /// Bound on connecting and on every round trip
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let conn = bounded(self.timeout, "connect", self.client.get_multiplexed_async_connection())
            .await
            .map_err(|e| {
                tracing::debug!(address = %self.address, error = %e, "Broker connect failed");
                e
            })?;
        tracing::debug!(address = %self.address, "Opened broker connection");

        Ok(Arc::new(RedisConnection {
            client: self.client.clone(),
            conn,
            capacity: self.capacity,
            timeout: self.timeout,
            forwarders: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        }))
    }
}

/// Run a Redis call under `limit`, mapping both failure kinds to a lost connection
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = redis::RedisResult<T>>,
) -> Result<T, BusError> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BusError::Connection(format!("{}: {}", what, e))),
        Err(_) => Err(BusError::Connection(format!("{} timed out after {:?}", what, limit))),
    }
}

/// One multiplexed command connection plus a pub/sub connection per channel
struct RedisConnection {
    client: redis::Client,
    conn: MultiplexedConnection,
    capacity: usize,
    timeout: Duration,
    /// Tasks relaying pub/sub messages into local broadcast channels
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    open: AtomicBool,
}

impl RedisConnection {
    fn check_open(&self) -> Result<(), BusError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Connection("connection closed".into()))
        }
    }

    fn stop_forwarders(&self) {
        for task in self.forwarders.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn ping(&self) -> Result<(), BusError> {
        self.check_open()?;
        let mut conn = self.conn.clone();
        let reply: String = bounded(self.timeout, "ping", redis::cmd("PING").query_async(&mut conn)).await?;
        if reply != "PONG" {
            return Err(BusError::Connection(format!("unexpected ping reply {:?}", reply)));
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        self.check_open()?;
        let mut conn = self.conn.clone();
        let publish = async move { conn.publish(channel, payload).await };
        let outcome: Result<redis::RedisResult<usize>, _> =
            tokio::time::timeout(self.timeout, publish).await;
        match outcome {
            Ok(Ok(receivers)) => Ok(receivers),
            Ok(Err(e)) => Err(BusError::Publish {
                channel: channel.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(BusError::Publish {
                channel: channel.to_string(),
                reason: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BusError> {
        self.check_open()?;
        let mut pubsub = bounded(self.timeout, "subscribe", self.client.get_async_pubsub()).await?;
        bounded(self.timeout, "subscribe", pubsub.subscribe(channel)).await?;

        let (tx, rx) = broadcast::channel(self.capacity);
        let name = channel.to_string();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        // Err: every local receiver is gone
                        if tx.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(channel = %name, error = %e, "Dropping non-text broker message");
                    }
                }
            }
            tracing::debug!(channel = %name, "Broker subscription ended");
        });

        let mut forwarders = self.forwarders.lock();
        forwarders.retain(|task| !task.is_finished());
        forwarders.push(task);
        Ok(rx)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.stop_forwarders();
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        self.stop_forwarders();
    }
}
