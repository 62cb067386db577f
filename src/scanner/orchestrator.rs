//! Scanner orchestrator
//!
//! Subscribes one worker per symbol to the bus. Every worker drives its own
//! [`MomentumEngine`]; all engines share the reference price, which only the
//! reference-symbol worker writes.

use super::types::BaseReferenceTable;
use crate::bus::{BusError, TickBus, TickSubscription};
use crate::config::ScannerConfig;
use crate::feed::Tick;
use crate::momentum::{EntrySignal, Evaluation, MomentumEngine};
use crate::shutdown::StopSignal;
use crate::telemetry::{self, CounterMetric};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Routes ticks for one subscription into its engine
pub struct TickRouter {
    engine: MomentumEngine,
    base_prices: Arc<BaseReferenceTable>,
    reference_symbol: String,
}

impl TickRouter {
    pub fn new(
        engine: MomentumEngine,
        base_prices: Arc<BaseReferenceTable>,
        reference_symbol: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            base_prices,
            reference_symbol: reference_symbol.into(),
        }
    }

    /// Handle one tick, returning a signal on entry
    ///
    /// Never fails: errors are logged with the symbol and the tick is dropped.
    pub fn dispatch(&mut self, tick: &Tick) -> Option<EntrySignal> {
        if tick.symbol == self.reference_symbol {
            self.engine.update_reference(tick);
            return None;
        }

        let Some(base_price) = self.base_prices.get(&tick.symbol) else {
            tracing::debug!(symbol = %tick.symbol, "No base price, skipping tick");
            return None;
        };

        match self.engine.assess(tick, base_price) {
            Ok(Evaluation::Entry(signal)) => {
                tracing::info!(
                    symbol = %signal.symbol,
                    price = %signal.price,
                    size = signal.size,
                    relative_strength = %signal.relative_strength.round_dp(2),
                    "Entry signal: buy"
                );
                telemetry::increment(CounterMetric::SignalsEmitted);
                Some(signal)
            }
            Ok(Evaluation::Rejected(reason)) => {
                tracing::trace!(symbol = %tick.symbol, %reason, "Tick rejected");
                None
            }
            Err(e) => {
                tracing::error!(symbol = %tick.symbol, error = %e, "Error processing tick");
                telemetry::increment(CounterMetric::TickErrors);
                None
            }
        }
    }

    /// Consume a subscription until it ends, forwarding signals
    ///
    /// Returns the number of ticks handled.
    pub async fn drive(
        mut self,
        mut subscription: TickSubscription,
        signals: mpsc::Sender<EntrySignal>,
    ) -> u64 {
        let mut handled = 0;
        while let Some(tick) = subscription.next().await {
            handled += 1;
            let Some(signal) = self.dispatch(&tick) else {
                continue;
            };
            match signals.try_send(signal) {
                Ok(()) => {}
                Err(TrySendError::Full(signal)) => {
                    tracing::warn!(symbol = %signal.symbol, "Signal channel full, dropping signal");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Signal receiver dropped");
                }
            }
        }
        handled
    }
}

/// Owns the tracked symbols and starts their subscription workers
pub struct Orchestrator {
    bus: Arc<TickBus>,
    engine: MomentumEngine,
    base_prices: Arc<BaseReferenceTable>,
    reference_symbol: String,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(bus: Arc<TickBus>, config: &ScannerConfig) -> Self {
        Self {
            bus,
            engine: MomentumEngine::new(config.momentum()),
            base_prices: Arc::new(BaseReferenceTable::from_prices(&config.base_prices)),
            reference_symbol: config.reference(),
            timeout: None,
        }
    }

    /// End every subscription after `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Symbols with a base price, plus the reference symbol
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols = self.base_prices.symbols();
        if !self.base_prices.contains(&self.reference_symbol) {
            symbols.push(self.reference_symbol.clone());
        }
        symbols
    }

    pub fn reference_symbol(&self) -> &str {
        &self.reference_symbol
    }

    /// Subscribe every symbol and spawn its worker
    ///
    /// All subscriptions are live when this returns, so ticks published
    /// afterwards are not lost.
    pub async fn start(
        &self,
        stop: StopSignal,
        signals: mpsc::Sender<EntrySignal>,
    ) -> Result<ScannerHandle, BusError> {
        let mut workers = Vec::new();
        for symbol in self.symbols() {
            let subscription = self.bus.subscribe(&symbol, self.timeout, stop.clone()).await?;
            let router = TickRouter::new(
                self.engine.sibling(),
                Arc::clone(&self.base_prices),
                self.reference_symbol.clone(),
            );
            let signals = signals.clone();
            let task = tokio::spawn(router.drive(subscription, signals));
            workers.push((symbol, task));
        }

        tracing::info!(
            symbols = ?workers.iter().map(|(s, _)| s.as_str()).collect::<Vec<_>>(),
            reference = %self.reference_symbol,
            "Scanner started"
        );
        Ok(ScannerHandle { workers })
    }
}

/// Running subscription workers
pub struct ScannerHandle {
    workers: Vec<(String, JoinHandle<u64>)>,
}

impl ScannerHandle {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to finish; returns total ticks handled
    pub async fn join(self) -> u64 {
        let mut total = 0;
        for (symbol, task) in self.workers {
            match task.await {
                Ok(handled) => {
                    tracing::debug!(%symbol, handled, "Subscription worker finished");
                    total += handled;
                }
                Err(e) => tracing::error!(%symbol, error = %e, "Subscription worker failed"),
            }
        }
        total
    }
}
