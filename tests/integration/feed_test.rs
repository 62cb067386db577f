//! Integration tests for the feed connector

use crate::support::{eventually, trade, Behavior, MockFeed, RecordingPublisher};
use momentum_scanner::bus::TickPublisher;
use momentum_scanner::feed::{Backoff, FeedError, PolygonFeed, ReconnectPolicy};
use momentum_scanner::shutdown;
use momentum_scanner::ws::WsConfig;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn policy(max_attempts: u32, delay: Duration) -> ReconnectPolicy {
    ReconnectPolicy {
        delay,
        max_attempts,
        backoff: Backoff::Fixed,
        max_delay: Duration::from_secs(1),
    }
}

fn ws(url: &str) -> WsConfig {
    WsConfig::new(url)
        .pong_timeout(Duration::from_millis(300))
        .connect_timeout(Duration::from_secs(2))
}

fn symbols() -> Vec<String> {
    vec!["aapl".into(), "SPY".into()]
}

#[tokio::test]
async fn test_feed_publishes_trades_only() {
    let frames = vec![
        trade("aapl", "185.5", 1704067200000, 100),
        r#"[{"ev":"Q","sym":"AAPL","bp":185.4,"ap":185.6}]"#.to_string(),
        "this is not json".to_string(),
        r#"[{"ev":"T","sym":"MSFT"},{"ev":"T","sym":"SPY","p":530.25,"t":1704067200001,"s":10}]"#
            .to_string(),
    ];
    let server = MockFeed::start(Behavior::Serve {
        subscribes: 2,
        frames,
        gap: Duration::from_millis(5),
        close_after: false,
    })
    .await;

    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(3, Duration::from_millis(10)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let (stop_tx, stop_rx) = shutdown::channel();
    let task = tokio::spawn(feed.run(Arc::clone(&publisher) as Arc<dyn TickPublisher>, stop_rx));

    assert!(eventually(Duration::from_secs(3), || publisher.ticks().len() == 2).await);
    let ticks = publisher.ticks();
    assert_eq!(ticks[0].symbol, "AAPL");
    assert_eq!(ticks[0].price, dec!(185.5));
    assert_eq!(ticks[1].symbol, "SPY");
    assert_eq!(ticks[1].size, 10);

    let received = server.received();
    assert_eq!(received[0], r#"{"action":"auth","params":"test-key"}"#);
    assert_eq!(received[1], r#"{"action":"subscribe","params":"T.AAPL"}"#);
    assert_eq!(received[2], r#"{"action":"subscribe","params":"T.SPY"}"#);

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("feed ignored stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let server = MockFeed::start(Behavior::Refuse).await;
    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(3, Duration::from_millis(10)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let (_stop_tx, stop_rx) = shutdown::channel();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        feed.run(Arc::new(RecordingPublisher::default()), stop_rx),
    )
    .await
    .expect("connector kept retrying");

    // Initial connect plus three reconnections
    assert!(matches!(result, Err(FeedError::ReconnectsExhausted { attempts: 3 })));
    assert_eq!(server.connections(), 4);

    // Closed for good: no further attempts
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connections(), 4);
}

#[tokio::test]
async fn test_rejected_credential_is_fatal() {
    let server = MockFeed::start(Behavior::RejectAuth).await;
    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(5, Duration::from_millis(10)),
        "bad-key",
        symbols(),
    )
    .unwrap();
    let (_stop_tx, stop_rx) = shutdown::channel();

    let result = feed
        .run(Arc::new(RecordingPublisher::default()), stop_rx)
        .await;
    assert!(matches!(result, Err(FeedError::AuthRejected(_))));
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_missing_auth_reply_counts_as_failure() {
    let server = MockFeed::start(Behavior::Silent).await;
    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(2, Duration::from_millis(10)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let (_stop_tx, stop_rx) = shutdown::channel();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        feed.run(Arc::new(RecordingPublisher::default()), stop_rx),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(FeedError::ReconnectsExhausted { attempts: 2 })));
    assert_eq!(server.connections(), 3);
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let server = MockFeed::start(Behavior::Serve {
        subscribes: 2,
        frames: vec![trade("AAPL", "186", 1704067200000, 1)],
        gap: Duration::from_millis(5),
        close_after: true,
    })
    .await;

    // Every session subscribes before failing, so the failure count resets
    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(2, Duration::from_millis(10)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let (stop_tx, stop_rx) = shutdown::channel();
    let task = tokio::spawn(feed.run(Arc::clone(&publisher) as Arc<dyn TickPublisher>, stop_rx));

    assert!(eventually(Duration::from_secs(3), || server.connections() >= 3).await);
    assert!(publisher.ticks().len() >= 2);

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_missed_pong_triggers_reconnect() {
    let server = MockFeed::start(Behavior::Deaf { subscribes: 2 }).await;
    let feed = PolygonFeed::with_settings(
        ws(&server.url)
            .ping_interval(Duration::from_millis(100))
            .pong_timeout(Duration::from_millis(200)),
        policy(3, Duration::from_millis(10)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let (stop_tx, stop_rx) = shutdown::channel();
    let task = tokio::spawn(feed.run(Arc::new(RecordingPublisher::default()), stop_rx));

    // Each session authenticated and subscribed; only the heartbeat can end it
    let subscribed_twice = || {
        server
            .received()
            .iter()
            .filter(|m| m.contains("T.SPY"))
            .count()
            >= 2
    };
    assert!(eventually(Duration::from_secs(5), subscribed_twice).await);
    assert!(server.connections() >= 2);

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("feed ignored stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_stop_during_backoff() {
    let server = MockFeed::start(Behavior::Refuse).await;
    let feed = PolygonFeed::with_settings(
        ws(&server.url),
        policy(5, Duration::from_secs(30)),
        "test-key",
        symbols(),
    )
    .unwrap();
    let (stop_tx, stop_rx) = shutdown::channel();
    let task = tokio::spawn(feed.run(Arc::new(RecordingPublisher::default()), stop_rx));

    assert!(eventually(Duration::from_secs(2), || server.connections() == 1).await);
    stop_tx.send(true).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("backoff not interrupted")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(server.connections(), 1);
}
