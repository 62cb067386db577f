//! Single WebSocket session with ping/pong keepalive
//!
//! Reconnection is the caller's business: a session either yields text frames
//! or fails, and the owner decides whether to open a new one.

use super::types::{WsConfig, WsError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open WebSocket connection
pub struct WsSession {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    ping_interval: Interval,
    pong_timeout: std::time::Duration,
    /// Set while a ping is outstanding
    pong_deadline: Option<Instant>,
}

impl WsSession {
    /// Open a connection to `config.url`
    pub async fn connect(config: &WsConfig) -> Result<Self, WsError> {
        tracing::info!(url = %config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = timeout(config.connect_timeout, connect_async(config.url.as_str()))
            .await
            .map_err(|_| WsError::ConnectionFailed("handshake timed out".into()))?
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        let (write, read) = ws_stream.split();

        // First ping one full interval after connect
        let mut ping_interval = interval_at(Instant::now() + config.ping_interval, config.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("WebSocket connected");

        Ok(Self {
            write,
            read,
            ping_interval,
            pong_timeout: config.pong_timeout,
            pong_deadline: None,
        })
    }

    /// Send a text frame
    pub async fn send_text(&mut self, text: String) -> Result<(), WsError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Wait for the next text frame
    ///
    /// Returns `Ok(None)` when the peer closes the connection with a close
    /// frame. Keepalive pings are sent while waiting; a missing pong fails the
    /// session with [`WsError::PongTimeout`].
    pub async fn next_text(&mut self) -> Result<Option<String>, WsError> {
        loop {
            let deadline = self.pong_deadline;
            let pong_wait = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                msg = self.read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                        Some(Ok(Message::Ping(data))) => {
                            self.write.send(Message::Pong(data)).await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.pong_deadline = None;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Received close frame");
                            return Ok(None);
                        }
                        Some(Ok(_)) => {
                            // Binary and raw frames are not part of the feed protocol
                        }
                        Some(Err(e)) => return Err(WsError::ConnectionFailed(e.to_string())),
                        None => {
                            return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                        }
                    }
                }

                _ = self.ping_interval.tick() => {
                    self.write.send(Message::Ping(Vec::new())).await
                        .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    if self.pong_deadline.is_none() {
                        self.pong_deadline = Some(Instant::now() + self.pong_timeout);
                    }
                }

                _ = pong_wait => {
                    return Err(WsError::PongTimeout(self.pong_timeout));
                }
            }
        }
    }

    /// Send a close frame and drop the connection
    pub async fn close(mut self) {
        if let Err(e) = self.write.close().await {
            tracing::debug!(error = %e, "Error while closing WebSocket");
        }
    }
}
