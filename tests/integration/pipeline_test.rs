//! End-to-end tests: feed server -> connector -> bus -> orchestrator -> signals

use crate::support::{trade, Behavior, MockFeed};
use chrono::{TimeZone, Utc};
use momentum_scanner::bus::{BusBackend, LocalBroker};
use momentum_scanner::config::{Config, ConfigError};
use momentum_scanner::scanner::{Pipeline, PipelineError};
use momentum_scanner::feed::FeedError;
use momentum_scanner::shutdown;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn config(url: &str) -> Config {
    let mut config: Config = toml::from_str(&format!(
        r#"
        [feed]
        url = "{url}"
        api_key = "test-key"
        tickers = ["NVDA"]
        reconnect_delay_secs = 0
        max_reconnect_attempts = 2
        pong_timeout_secs = 1
        connect_timeout_secs = 2

        [bus]
        retry_base_delay_ms = 5
        "#
    ))
    .unwrap();
    config.scanner.history_window = 5;
    config
}

fn window_millis(second: u32) -> i64 {
    Utc.with_ymd_and_hms(2024, 6, 3, 15, 50, second)
        .unwrap()
        .timestamp_millis()
}

#[tokio::test]
async fn test_entry_signal_end_to_end() {
    let mut frames = vec![trade("SPY", "530.0", window_millis(0), 100)];
    for (i, price) in ["1130", "1132", "1134", "1136", "1138"].iter().enumerate() {
        frames.push(trade("NVDA", price, window_millis(1 + i as u32), 100));
    }
    // Quote and a thin trade in between must not disturb anything
    frames.push(r#"[{"ev":"Q","sym":"NVDA","bp":1139.0}]"#.to_string());
    frames.push(trade("NVDA", "1140.0", window_millis(10), 1200));

    let server = MockFeed::start(Behavior::Serve {
        subscribes: 2,
        frames,
        gap: Duration::from_millis(40),
        close_after: false,
    })
    .await;

    let (stop_tx, stop_rx) = shutdown::channel();
    let (signal_tx, mut signal_rx) = mpsc::channel(8);
    let pipeline = Pipeline::new(config(&server.url), Arc::new(LocalBroker::default()));
    let task = tokio::spawn(pipeline.run(stop_rx, signal_tx));

    let signal = tokio::time::timeout(Duration::from_secs(5), signal_rx.recv())
        .await
        .expect("no entry signal")
        .expect("signal channel closed");
    assert_eq!(signal.symbol, "NVDA");
    assert_eq!(signal.price, dec!(1140));
    assert_eq!(signal.size, 1200);
    assert!(signal.relative_strength > dec!(1.5));

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(3), task)
        .await
        .expect("pipeline ignored stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(signal_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_thin_trade_emits_nothing() {
    let mut frames = vec![trade("SPY", "530.0", window_millis(0), 100)];
    for (i, price) in ["1130", "1132", "1134", "1136", "1138"].iter().enumerate() {
        frames.push(trade("NVDA", price, window_millis(1 + i as u32), 100));
    }
    frames.push(trade("NVDA", "1140.0", window_millis(10), 500));

    let server = MockFeed::start(Behavior::Serve {
        subscribes: 2,
        frames,
        gap: Duration::from_millis(20),
        close_after: false,
    })
    .await;

    let (stop_tx, stop_rx) = shutdown::channel();
    let (signal_tx, mut signal_rx) = mpsc::channel(8);
    let pipeline = Pipeline::new(config(&server.url), Arc::new(LocalBroker::default()));
    let task = tokio::spawn(pipeline.run(stop_rx, signal_tx));

    tokio::time::sleep(Duration::from_millis(500)).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
    assert!(signal_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_exhausted_feed_stops_pipeline() {
    let server = MockFeed::start(Behavior::Refuse).await;
    let (_stop_tx, stop_rx) = shutdown::channel();
    let (signal_tx, _signal_rx) = mpsc::channel(8);

    let pipeline = Pipeline::new(config(&server.url), Arc::new(LocalBroker::default()));
    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.run(stop_rx, signal_tx))
        .await
        .expect("pipeline did not notice the dead feed");

    assert!(matches!(
        result,
        Err(PipelineError::Feed(FeedError::ReconnectsExhausted { attempts: 2 }))
    ));
    assert_eq!(server.connections(), 3);
}

#[tokio::test]
async fn test_missing_credential_rejected_before_start() {
    let server = MockFeed::start(Behavior::Refuse).await;
    let mut config = config(&server.url);
    config.feed.api_key = None;
    let (_stop_tx, stop_rx) = shutdown::channel();
    let (signal_tx, _signal_rx) = mpsc::channel(8);

    let result = Pipeline::new(config, Arc::new(LocalBroker::default()))
        .run(stop_rx, signal_tx)
        .await;
    assert!(matches!(result, Err(PipelineError::Config(_))));
    assert_eq!(server.connections(), 0);
}

#[tokio::test]
async fn test_zero_ping_interval_rejected_before_start() {
    let server = MockFeed::start(Behavior::Refuse).await;
    let mut config = config(&server.url);
    config.feed.ping_interval_secs = 0;
    let (_stop_tx, stop_rx) = shutdown::channel();
    let (signal_tx, _signal_rx) = mpsc::channel(8);

    let result = Pipeline::new(config, Arc::new(LocalBroker::default()))
        .run(stop_rx, signal_tx)
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::ZeroDuration("feed.ping_interval_secs")))
    ));
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.scanner.reference(), "SPY");
    assert_eq!(config.feed.max_reconnect_attempts, 5);
    assert_eq!(config.bus.backend, BusBackend::Redis);
    assert_eq!(config.bus.host, "localhost");
    assert_eq!(config.bus.port, 6379);
}
