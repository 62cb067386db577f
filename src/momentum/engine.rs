//! Momentum engine
//!
//! Decides on every tick whether a symbol is breaking out relative to the
//! reference symbol during the target window. Each engine owns the histories of
//! the symbols it is fed; the reference price is shared between engines with a
//! single writer.

use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use super::history::SymbolHistory;
use super::types::{EngineError, EntrySignal, Evaluation, RejectReason};
use crate::feed::Tick;

/// Fixed daily UTC window in which entries are allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWindow {
    pub hour: u32,
    /// First minute, inclusive
    pub minute_start: u32,
    /// Last minute, inclusive
    pub minute_end: u32,
}

impl TargetWindow {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let minute = timestamp.minute();
        timestamp.hour() == self.hour && minute >= self.minute_start && minute <= self.minute_end
    }
}

impl Default for TargetWindow {
    fn default() -> Self {
        Self {
            hour: 15,
            minute_start: 45,
            minute_end: 59,
        }
    }
}

/// Configuration for momentum evaluation
#[derive(Debug, Clone)]
pub struct MomentumConfig {
    /// Minimum relative strength in percentage points (default: 1.5)
    pub momentum_threshold: Decimal,

    /// Minimum trade size (default: 1000)
    pub volume_threshold: u64,

    /// Prices the current price must exceed (default: 5)
    pub history_window: usize,

    /// Entry window (default: 15:45-15:59 UTC)
    pub target_window: TargetWindow,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            momentum_threshold: dec!(1.5),
            volume_threshold: 1000,
            history_window: 5,
            target_window: TargetWindow::default(),
        }
    }
}

/// Latest reference-symbol price, shared across engines
#[derive(Debug, Clone, Default)]
pub struct ReferencePrice(Arc<RwLock<Option<Decimal>>>);

impl ReferencePrice {
    pub fn get(&self) -> Option<Decimal> {
        *self.0.read()
    }

    pub fn set(&self, price: Decimal) {
        *self.0.write() = Some(price);
    }
}

/// Relative strength of `price` over `reference`, both measured against `base`
///
/// `((price - base) / base - (reference - base) / base) * 100`
pub fn relative_strength(price: Decimal, reference: Decimal, base: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    let stock_return = price.checked_sub(base)?.checked_div(base)?;
    let reference_return = reference.checked_sub(base)?.checked_div(base)?;
    stock_return
        .checked_sub(reference_return)?
        .checked_mul(dec!(100))
}

/// Per-tick momentum evaluation
#[derive(Debug)]
pub struct MomentumEngine {
    config: MomentumConfig,
    reference: ReferencePrice,
    histories: HashMap<String, SymbolHistory>,
}

impl MomentumEngine {
    pub fn new(config: MomentumConfig) -> Self {
        Self::with_reference(config, ReferencePrice::default())
    }

    /// Create an engine reading an existing shared reference price
    pub fn with_reference(config: MomentumConfig, reference: ReferencePrice) -> Self {
        Self {
            config,
            reference,
            histories: HashMap::new(),
        }
    }

    /// New engine with the same config and reference price but no history
    pub fn sibling(&self) -> Self {
        Self::with_reference(self.config.clone(), self.reference.clone())
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    pub fn reference(&self) -> Option<Decimal> {
        self.reference.get()
    }

    /// Overwrite the reference price with this tick's price
    pub fn update_reference(&self, tick: &Tick) {
        self.reference.set(tick.price);
        tracing::trace!(symbol = %tick.symbol, price = %tick.price, "Reference price updated");
    }

    /// Whether `tick` satisfies the entry condition
    pub fn evaluate(&mut self, tick: &Tick, base_price: Decimal) -> bool {
        matches!(self.assess(tick, base_price), Ok(evaluation) if evaluation.is_entry())
    }

    /// Evaluate `tick`, reporting which gate rejected it
    ///
    /// The tick is recorded into its symbol's history before any gate runs.
    /// The momentum gate compares against the prices recorded before this one.
    pub fn assess(&mut self, tick: &Tick, base_price: Decimal) -> Result<Evaluation, EngineError> {
        let window = self.config.history_window;
        let history = self
            .histories
            .entry(tick.symbol.clone())
            .or_insert_with(|| SymbolHistory::new(window));
        let rising = history.exceeds_recent(tick.price);
        history.record(tick.timestamp, tick.price);

        let reference = match self.reference.get() {
            Some(price) => price,
            None => return Ok(Evaluation::Rejected(RejectReason::ReferenceNotReady)),
        };
        if !self.config.target_window.contains(tick.timestamp) {
            return Ok(Evaluation::Rejected(RejectReason::OutsideWindow));
        }

        if base_price <= Decimal::ZERO {
            return Err(EngineError::InvalidBasePrice {
                symbol: tick.symbol.clone(),
                price: base_price,
            });
        }
        let strength = relative_strength(tick.price, reference, base_price).ok_or_else(|| {
            EngineError::Overflow {
                symbol: tick.symbol.clone(),
            }
        })?;
        if strength < self.config.momentum_threshold {
            return Ok(Evaluation::Rejected(RejectReason::WeakRelativeStrength(strength)));
        }

        if tick.size < self.config.volume_threshold {
            return Ok(Evaluation::Rejected(RejectReason::LowVolume(tick.size)));
        }

        if !rising {
            return Ok(Evaluation::Rejected(RejectReason::NoMomentum));
        }

        Ok(Evaluation::Entry(EntrySignal::new(
            tick.symbol.clone(),
            tick.price,
            tick.size,
            strength,
            tick.timestamp,
        )))
    }

    /// Stored history length for `symbol`
    pub fn history_len(&self, symbol: &str) -> usize {
        self.histories.get(symbol).map(SymbolHistory::len).unwrap_or(0)
    }
}
