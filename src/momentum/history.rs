//! Bounded per-symbol price history

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Most recent prices for one symbol, oldest first
///
/// Grows to at most `2 * window` entries, then compacts back to the newest
/// `window`.
#[derive(Debug, Clone)]
pub struct SymbolHistory {
    window: usize,
    prices: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl SymbolHistory {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            prices: VecDeque::with_capacity(window * 2 + 1),
        }
    }

    /// Append a price, compacting once the history exceeds twice the window
    pub fn record(&mut self, timestamp: DateTime<Utc>, price: Decimal) {
        self.prices.push_back((timestamp, price));
        if self.prices.len() > self.window * 2 {
            let excess = self.prices.len() - self.window;
            self.prices.drain(..excess);
        }
    }

    /// True when `price` is strictly above each of the last `window` prices
    ///
    /// Fails closed with fewer than `window` stored prices.
    pub fn exceeds_recent(&self, price: Decimal) -> bool {
        if self.prices.len() < self.window {
            return false;
        }
        self.prices
            .iter()
            .rev()
            .take(self.window)
            .all(|(_, prev)| price > *prev)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Newest recorded price
    pub fn last_price(&self) -> Option<Decimal> {
        self.prices.back().map(|(_, p)| *p)
    }
}
