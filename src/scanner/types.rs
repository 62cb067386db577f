//! Scanner types

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Anchor price per symbol, fixed at startup
#[derive(Debug, Clone, Default)]
pub struct BaseReferenceTable {
    prices: HashMap<String, Decimal>,
}

impl BaseReferenceTable {
    /// Build from configured prices; symbols are upper-cased
    pub fn from_prices(prices: &BTreeMap<String, Decimal>) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(symbol, price)| (symbol.trim().to_uppercase(), *price))
                .collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.prices.contains_key(symbol)
    }

    /// Symbols in the table, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.prices.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
