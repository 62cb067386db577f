//! Tick publish/subscribe over a broker connection

use super::types::channel_name;
use super::{BusError, Broker, BrokerConnection, TickPublisher};
use crate::config::BusConfig;
use crate::feed::Tick;
use crate::telemetry::{self, GaugeMetric};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{sleep, sleep_until, Instant};

/// Per-symbol tick bus
///
/// The broker connection is checked before every operation and re-established
/// with exponential backoff if it has gone away. Once a full retry round has
/// failed the bus is degraded: later calls try a single reconnect and fail
/// immediately instead of sleeping through the backoff again.
pub struct TickBus {
    broker: Arc<dyn Broker>,
    link: Mutex<Link>,
    config: BusConfig,
}

#[derive(Default)]
struct Link {
    connection: Option<Arc<dyn BrokerConnection>>,
    degraded: bool,
}

impl TickBus {
    /// Connect to the broker, retrying per `config`
    pub async fn connect(broker: Arc<dyn Broker>, config: BusConfig) -> Result<Self, BusError> {
        let bus = Self {
            broker,
            link: Mutex::new(Link::default()),
            config,
        };
        bus.ensure_connection().await?;
        Ok(bus)
    }

    /// Connect and verify the new connection answers
    async fn open(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let conn = self.broker.connect().await?;
        conn.ping().await?;
        Ok(conn)
    }

    /// Open a fresh broker connection with bounded retries
    async fn establish(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match self.open().await {
                Ok(conn) => {
                    tracing::info!("Connected to broker");
                    return Ok(conn);
                }
                Err(e) if attempt + 1 >= attempts => {
                    tracing::error!(error = %e, attempts, "Failed to connect to broker");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = attempt + 1,
                        attempts,
                        "Broker connection failed, retrying"
                    );
                    sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .retry_base_delay()
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(Duration::MAX)
    }

    /// Return a live connection, reconnecting if the current one is dead
    async fn ensure_connection(&self) -> Result<Arc<dyn BrokerConnection>, BusError> {
        let mut link = self.link.lock().await;
        if let Some(conn) = link.connection.as_ref() {
            match conn.ping().await {
                Ok(()) => return Ok(Arc::clone(conn)),
                Err(e) => {
                    tracing::warn!(error = %e, "Broker connection lost, attempting to reconnect");
                    link.connection = None;
                }
            }
        }

        let result = if link.degraded {
            self.open().await.map_err(|e| {
                tracing::debug!(error = %e, "Broker still unreachable");
                e
            })
        } else {
            self.establish().await
        };

        match result {
            Ok(conn) => {
                if link.degraded {
                    tracing::info!("Broker connection restored");
                }
                link.degraded = false;
                link.connection = Some(Arc::clone(&conn));
                Ok(conn)
            }
            Err(e) => {
                link.degraded = true;
                Err(e)
            }
        }
    }

    /// Publish a tick on the symbol's channel
    ///
    /// Returns how many subscribers received it. Zero is not an error: with
    /// nobody listening the tick is dropped.
    pub async fn publish(&self, symbol: &str, tick: &Tick) -> Result<usize, BusError> {
        let channel = channel_name(symbol);
        let payload = serde_json::to_string(tick).map_err(|e| {
            tracing::error!(%channel, error = %e, "Failed to serialize tick");
            BusError::Serialization(e)
        })?;

        let conn = self.ensure_connection().await?;
        match conn.publish(&channel, payload).await {
            Ok(receivers) => {
                tracing::debug!(%channel, receivers, "Published tick");
                Ok(receivers)
            }
            Err(e) => {
                tracing::error!(%channel, error = %e, "Failed to publish tick");
                Err(e)
            }
        }
    }

    /// Subscribe to a symbol's channel
    ///
    /// The subscription ends when `timeout` (measured from now) elapses, when
    /// `shutdown` flips to `true`, or when the broker drops the channel.
    pub async fn subscribe(
        &self,
        symbol: &str,
        timeout: Option<Duration>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<TickSubscription, BusError> {
        let channel = channel_name(symbol);
        let conn = self.ensure_connection().await?;
        let receiver = conn.subscribe(&channel).await?;

        tracing::info!(%channel, ?timeout, "Subscribed");
        telemetry::adjust_gauge(GaugeMetric::ActiveSubscriptions, 1.0);

        Ok(TickSubscription {
            channel,
            receiver,
            deadline: timeout.map(|t| Instant::now() + t),
            shutdown,
            done: false,
        })
    }

    /// Subscribe and invoke `handler` for every tick until the subscription ends
    ///
    /// Returns the number of ticks handled.
    pub async fn listen<F>(
        &self,
        symbol: &str,
        timeout: Option<Duration>,
        shutdown: watch::Receiver<bool>,
        mut handler: F,
    ) -> Result<u64, BusError>
    where
        F: FnMut(Tick),
    {
        let mut subscription = self.subscribe(symbol, timeout, shutdown).await?;
        let mut handled = 0;
        while let Some(tick) = subscription.next().await {
            handler(tick);
            handled += 1;
        }
        Ok(handled)
    }

    /// Close the broker connection
    pub async fn close(&self) {
        if let Some(conn) = self.link.lock().await.connection.take() {
            conn.close().await;
            tracing::info!("Broker connection closed");
        }
    }
}

#[async_trait]
impl TickPublisher for TickBus {
    async fn publish_tick(&self, tick: &Tick) -> Result<usize, BusError> {
        self.publish(&tick.symbol, tick).await
    }
}

/// A live subscription to one channel
///
/// Pull ticks with [`TickSubscription::next`]; `None` means the subscription
/// is over and will stay over.
pub struct TickSubscription {
    channel: String,
    receiver: broadcast::Receiver<String>,
    deadline: Option<Instant>,
    shutdown: watch::Receiver<bool>,
    done: bool,
}

impl TickSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next tick
    pub async fn next(&mut self) -> Option<Tick> {
        loop {
            if self.done {
                return None;
            }
            if *self.shutdown.borrow() {
                tracing::debug!(channel = %self.channel, "Subscription cancelled");
                self.done = true;
                return None;
            }

            let deadline = self.deadline;
            let expired = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Stop flag owner is gone; nothing can cancel us later
                        tracing::debug!(channel = %self.channel, "Stop signal dropped, ending subscription");
                        self.done = true;
                    }
                }

                _ = expired => {
                    tracing::info!(channel = %self.channel, "Subscription timeout reached");
                    self.done = true;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Ok(payload) => match serde_json::from_str::<Tick>(&payload) {
                            Ok(tick) => return Some(tick),
                            Err(e) => {
                                tracing::error!(channel = %self.channel, error = %e, "Failed to decode message");
                            }
                        },
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(channel = %self.channel, skipped, "Subscriber lagging, ticks dropped");
                        }
                        Err(RecvError::Closed) => {
                            tracing::info!(channel = %self.channel, "Channel closed by broker");
                            self.done = true;
                        }
                    }
                }
            }
        }
    }
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        telemetry::adjust_gauge(GaugeMetric::ActiveSubscriptions, -1.0);
        tracing::info!(channel = %self.channel, "Unsubscribed");
    }
}
