//! Loopback feed server for connector tests

use futures_util::{SinkExt, StreamExt};
use momentum_scanner::bus::{BusError, TickPublisher};
use momentum_scanner::feed::Tick;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const AUTH_SUCCESS: &str =
    r#"[{"ev":"status","status":"auth_success","message":"authenticated"}]"#;
pub const AUTH_FAILED: &str =
    r#"[{"ev":"status","status":"auth_failed","message":"authentication failed"}]"#;

/// How the server treats each connection
#[derive(Clone)]
pub enum Behavior {
    /// Authenticate, wait for `subscribes` requests, send `frames` spaced by
    /// `gap`, then either hold the connection open or close it
    Serve {
        subscribes: usize,
        frames: Vec<String>,
        gap: Duration,
        close_after: bool,
    },
    /// Authenticate, accept `subscribes` requests, then stop reading so
    /// keepalive pings go unanswered
    Deaf { subscribes: usize },
    /// Reply `auth_failed`
    RejectAuth,
    /// Complete the handshake but never answer
    Silent,
    /// Drop the TCP connection before the WebSocket handshake
    Refuse,
}

/// A running loopback feed server
pub struct MockFeed {
    pub url: String,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockFeed {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let conns = Arc::clone(&connections);
        let log = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                conns.fetch_add(1, Ordering::SeqCst);
                let behavior = behavior.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    if matches!(behavior, Behavior::Refuse) {
                        drop(stream);
                        return;
                    }
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    serve(ws, behavior, log).await;
                });
            }
        });

        Self {
            url,
            connections,
            received,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Text frames received from clients, in order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

async fn serve(
    mut ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    behavior: Behavior,
    log: Arc<Mutex<Vec<String>>>,
) {
    match behavior {
        Behavior::Serve {
            subscribes,
            frames,
            gap,
            close_after,
        } => {
            if !read_texts(&mut ws, 1, &log).await {
                return;
            }
            if ws.send(Message::Text(AUTH_SUCCESS.into())).await.is_err() {
                return;
            }
            if !read_texts(&mut ws, subscribes, &log).await {
                return;
            }
            for frame in frames {
                tokio::time::sleep(gap).await;
                if ws.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
            if close_after {
                let _ = ws.close(None).await;
                return;
            }
            drain(&mut ws, &log).await;
        }
        Behavior::Deaf { subscribes } => {
            if !read_texts(&mut ws, 1, &log).await {
                return;
            }
            if ws.send(Message::Text(AUTH_SUCCESS.into())).await.is_err() {
                return;
            }
            if !read_texts(&mut ws, subscribes, &log).await {
                return;
            }
            // Hold the socket without polling it
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Behavior::RejectAuth => {
            if read_texts(&mut ws, 1, &log).await {
                let _ = ws.send(Message::Text(AUTH_FAILED.into())).await;
            }
            drain(&mut ws, &log).await;
        }
        Behavior::Silent => drain(&mut ws, &log).await,
        Behavior::Refuse => {}
    }
}

/// Read `count` text frames into `log`; false if the client went away
async fn read_texts(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    count: usize,
    log: &Mutex<Vec<String>>,
) -> bool {
    let mut seen = 0;
    while seen < count {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                log.lock().push(text);
                seen += 1;
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return false,
            Some(Ok(_)) => {}
        }
    }
    true
}

/// Keep reading (which also answers pings) until the client leaves
async fn drain(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    log: &Mutex<Vec<String>>,
) {
    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(text) => log.lock().push(text),
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Trade frame in the feed's wire format
pub fn trade(symbol: &str, price: &str, millis: i64, size: u64) -> String {
    format!(
        r#"[{{"ev":"T","sym":"{}","p":{},"t":{},"s":{}}}]"#,
        symbol, price, millis, size
    )
}

/// Publisher that records every tick it is handed
#[derive(Default)]
pub struct RecordingPublisher {
    ticks: Mutex<Vec<Tick>>,
}

impl RecordingPublisher {
    pub fn ticks(&self) -> Vec<Tick> {
        self.ticks.lock().clone()
    }
}

#[async_trait::async_trait]
impl TickPublisher for RecordingPublisher {
    async fn publish_tick(&self, tick: &Tick) -> Result<usize, BusError> {
        self.ticks.lock().push(tick.clone());
        Ok(1)
    }
}

/// Poll `check` until it holds or `limit` passes
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
