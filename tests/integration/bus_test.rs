//! Integration tests for the distribution bus

use chrono::{TimeZone, Utc};
use momentum_scanner::bus::{LocalBroker, TickBus};
use momentum_scanner::config::BusConfig;
use momentum_scanner::feed::Tick;
use momentum_scanner::shutdown;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn tick(symbol: &str) -> Tick {
    Tick::trade(
        symbol,
        dec!(430.5),
        Utc.timestamp_millis_opt(1704067200000).unwrap(),
        250,
    )
}

async fn bus(broker: &LocalBroker) -> TickBus {
    TickBus::connect(Arc::new(broker.clone()), BusConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_case_insensitive_channels() {
    let broker = LocalBroker::default();
    let bus = bus(&broker).await;
    let (_stop_tx, stop_rx) = shutdown::channel();

    let mut upper = bus.subscribe("MSFT", None, stop_rx.clone()).await.unwrap();
    let mut lower = bus.subscribe("msft", None, stop_rx).await.unwrap();

    assert_eq!(bus.publish("msft", &tick("msft")).await.unwrap(), 2);
    assert_eq!(upper.next().await.unwrap().symbol, "MSFT");
    assert_eq!(lower.next().await.unwrap().symbol, "MSFT");
}

#[tokio::test]
async fn test_publish_without_subscriber_is_lost() {
    let broker = LocalBroker::default();
    let bus = bus(&broker).await;
    let (_stop_tx, stop_rx) = shutdown::channel();

    assert_eq!(bus.publish("AAPL", &tick("AAPL")).await.unwrap(), 0);

    let mut late = bus
        .subscribe("AAPL", Some(Duration::from_millis(100)), stop_rx)
        .await
        .unwrap();
    assert!(late.next().await.is_none());
}

#[tokio::test]
async fn test_timeout_measured_from_subscribe() {
    let broker = LocalBroker::default();
    let bus = Arc::new(bus(&broker).await);
    let (_stop_tx, stop_rx) = shutdown::channel();

    let started = Instant::now();
    let listener = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            bus.listen("TSLA", Some(Duration::from_millis(300)), stop_rx, |_| {})
                .await
                .unwrap()
        })
    };

    // Steady traffic must not extend the deadline
    let publisher = {
        let bus = Arc::clone(&bus);
        tokio::spawn(async move {
            for _ in 0..40 {
                let _ = bus.publish("TSLA", &tick("TSLA")).await;
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
        })
    };

    let handled = tokio::time::timeout(Duration::from_secs(2), listener)
        .await
        .expect("listener outlived its timeout")
        .unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(900));
    assert!(handled > 0);
    publisher.abort();
}

#[tokio::test]
async fn test_stop_releases_every_subscription() {
    let broker = LocalBroker::default();
    let bus = Arc::new(bus(&broker).await);
    let (stop_tx, stop_rx) = shutdown::channel();

    let mut tasks = Vec::new();
    for symbol in ["AAPL", "MSFT", "NVDA"] {
        let bus = Arc::clone(&bus);
        let stop_rx = stop_rx.clone();
        tasks.push(tokio::spawn(async move {
            bus.listen(symbol, None, stop_rx, |_| {}).await.unwrap()
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.subscriber_count("tick:nvda"), 1);

    stop_tx.send(true).unwrap();
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("subscription ignored stop")
            .unwrap();
    }
    assert_eq!(broker.subscriber_count("tick:nvda"), 0);
}
