//! Polygon-style trade feed connector
//!
//! Owns one WebSocket session at a time: authenticates, subscribes to `T.<SYM>`
//! for every tracked symbol and republishes trades on the bus. Failed sessions
//! are retried per the [`ReconnectPolicy`]; running out of attempts or a
//! rejected credential ends the connector for good.

use super::decode::decode_frame;
use super::state::{ConnectionState, ConnectionTracker, ReconnectPolicy};
use super::types::{ControlMessage, FeedEvent};
use crate::bus::TickPublisher;
use crate::config::FeedConfig;
use crate::shutdown::{self, StopSignal};
use crate::telemetry::{self, CounterMetric};
use crate::ws::{WsConfig, WsError, WsSession};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, sleep_until, Instant};

/// Feed connector errors
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(#[from] WsError),
    #[error("no authentication reply within {0:?}")]
    AuthTimeout(Duration),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("connection closed by server")]
    ClosedByPeer,
    #[error("API credential is missing")]
    MissingCredential,
    #[error("gave up after {attempts} failed reconnection attempts")]
    ReconnectsExhausted { attempts: u32 },
}

impl FeedError {
    /// Whether retrying can never help
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FeedError::AuthRejected(_)
                | FeedError::MissingCredential
                | FeedError::ReconnectsExhausted { .. }
        )
    }
}

/// Authentication outcome carried by a status frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Accepted,
    Rejected(String),
}

/// Trade feed connector
pub struct PolygonFeed {
    ws: WsConfig,
    api_key: String,
    symbols: Vec<String>,
    tracker: ConnectionTracker,
}

impl PolygonFeed {
    /// Build a connector for `symbols`; an empty credential is rejected
    pub fn new(
        config: &FeedConfig,
        api_key: impl Into<String>,
        symbols: Vec<String>,
    ) -> Result<Self, FeedError> {
        Self::with_settings(config.ws_config(), config.reconnect_policy(), api_key, symbols)
    }

    /// Build a connector from explicit transport and retry settings
    pub fn with_settings(
        ws: WsConfig,
        policy: ReconnectPolicy,
        api_key: impl Into<String>,
        symbols: Vec<String>,
    ) -> Result<Self, FeedError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(FeedError::MissingCredential);
        }
        let symbols = symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            ws,
            api_key,
            symbols,
            tracker: ConnectionTracker::new(policy),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Run until `stop` flips to `true` or the connector gives up
    ///
    /// Returns `Ok` only for a requested stop.
    pub async fn run(
        mut self,
        publisher: Arc<dyn TickPublisher>,
        mut stop: StopSignal,
    ) -> Result<(), FeedError> {
        tracing::info!(symbols = ?self.symbols, url = %self.ws.url, "Starting feed connector");

        while self.tracker.can_connect() {
            if *stop.borrow() {
                break;
            }

            let error = match self.session(publisher.as_ref(), &mut stop).await {
                Ok(()) => break,
                Err(e) => e,
            };

            if error.is_fatal() {
                tracing::error!(error = %error, "Feed connector failed permanently");
                self.tracker.transition(ConnectionState::Closed);
                return Err(error);
            }

            tracing::warn!(error = %error, failures = self.tracker.failures() + 1, "Feed session failed");
            let Some(delay) = self.tracker.on_failure() else {
                let attempts = self.tracker.reconnect_attempts();
                tracing::error!(attempts, "Max reconnection attempts reached, feed closed");
                return Err(FeedError::ReconnectsExhausted { attempts });
            };

            telemetry::increment(CounterMetric::ReconnectAttempts);
            tracing::info!(
                attempt = self.tracker.failures(),
                max_attempts = self.tracker.policy().max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown::requested(&mut stop) => break,
            }
        }

        self.tracker.shutdown();
        tracing::info!("Feed connector stopped");
        Ok(())
    }

    /// One connection from open to failure or stop; `Ok` means stopped
    async fn session(
        &mut self,
        publisher: &dyn TickPublisher,
        stop: &mut StopSignal,
    ) -> Result<(), FeedError> {
        self.tracker.transition(ConnectionState::Connecting);
        let mut session = tokio::select! {
            result = WsSession::connect(&self.ws) => result?,
            _ = shutdown::requested(stop) => return Ok(()),
        };

        self.tracker.transition(ConnectionState::Authenticating);
        session.send_text(control("auth", &self.api_key)).await?;

        let auth_timeout = self.ws.pong_timeout;
        let auth_deadline = Instant::now() + auth_timeout;
        let mut authenticated = false;

        loop {
            tokio::select! {
                biased;

                _ = shutdown::requested(stop) => {
                    session.close().await;
                    return Ok(());
                }

                _ = sleep_until(auth_deadline), if !authenticated => {
                    session.close().await;
                    return Err(FeedError::AuthTimeout(auth_timeout));
                }

                frame = session.next_text() => {
                    let Some(text) = frame? else {
                        return Err(FeedError::ClosedByPeer);
                    };
                    match dispatch_frame(&text, publisher).await {
                        Some(AuthStatus::Accepted) if !authenticated => {
                            tracing::info!("Authenticated with feed");
                            for symbol in &self.symbols {
                                let params = format!("T.{}", symbol);
                                session.send_text(control("subscribe", &params)).await?;
                                tracing::debug!(%symbol, "Subscribe request sent");
                            }
                            authenticated = true;
                            self.tracker.transition(ConnectionState::Subscribed);
                            tracing::info!(count = self.symbols.len(), "Subscribed to trade streams");
                        }
                        Some(AuthStatus::Rejected(message)) => {
                            session.close().await;
                            return Err(FeedError::AuthRejected(message));
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn control(action: &str, params: &str) -> String {
    // Two borrowed strings always serialize
    serde_json::to_string(&ControlMessage { action, params }).unwrap_or_default()
}

/// Decode one frame and publish its trades
///
/// Malformed elements and non-trade events are dropped here. Returns the
/// authentication status if the frame carried one.
pub async fn dispatch_frame(text: &str, publisher: &dyn TickPublisher) -> Option<AuthStatus> {
    let events = match decode_frame(text) {
        Ok(events) => events,
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable frame");
            telemetry::increment(CounterMetric::FramesDropped);
            return None;
        }
    };

    let mut auth = None;
    for event in events {
        match event {
            Ok(FeedEvent::Trade(tick)) => match publisher.publish_tick(&tick).await {
                Ok(_) => telemetry::increment(CounterMetric::TicksPublished),
                Err(e) => {
                    tracing::warn!(symbol = %tick.symbol, error = %e, "Failed to publish tick");
                    telemetry::increment(CounterMetric::PublishFailures);
                }
            },
            Ok(FeedEvent::Status { status, message }) => match status.as_str() {
                "auth_success" => auth = Some(AuthStatus::Accepted),
                "auth_failed" => auth = Some(AuthStatus::Rejected(message)),
                _ => tracing::info!(%status, %message, "Feed status"),
            },
            Ok(FeedEvent::Ignored(kind)) => {
                tracing::trace!(%kind, "Ignoring non-trade event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed event");
                telemetry::increment(CounterMetric::FramesDropped);
            }
        }
    }
    auth
}
