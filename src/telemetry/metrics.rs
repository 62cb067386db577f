//! Pipeline metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless a
//! recorder (the Prometheus exporter) is installed.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Trade ticks published onto the bus
    TicksPublished,
    /// Frames or frame elements dropped as malformed
    FramesDropped,
    /// Publish calls that failed
    PublishFailures,
    /// Feed reconnection attempts
    ReconnectAttempts,
    /// Entry signals emitted by the engine
    SignalsEmitted,
    /// Errors raised while handling a tick
    TickErrors,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Open bus subscriptions
    ActiveSubscriptions,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::TicksPublished => "scanner_ticks_published_total",
            CounterMetric::FramesDropped => "scanner_frames_dropped_total",
            CounterMetric::PublishFailures => "scanner_publish_failures_total",
            CounterMetric::ReconnectAttempts => "scanner_feed_reconnects_total",
            CounterMetric::SignalsEmitted => "scanner_signals_total",
            CounterMetric::TickErrors => "scanner_tick_errors_total",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::ActiveSubscriptions => "scanner_active_subscriptions",
        }
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    metrics::counter!(metric.name()).increment(1);
}

/// Adjust a gauge by `delta`
pub fn adjust_gauge(metric: GaugeMetric, delta: f64) {
    let gauge = metrics::gauge!(metric.name());
    if delta >= 0.0 {
        gauge.increment(delta);
    } else {
        gauge.decrement(-delta);
    }
}

/// Install the Prometheus exporter on `0.0.0.0:port`
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
