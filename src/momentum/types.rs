//! Momentum evaluation types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Buy signal produced when a tick passes every entry gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    /// Unique signal ID
    pub id: Uuid,

    /// Upper-case ticker symbol
    pub symbol: String,

    /// Trade price that triggered the entry
    pub price: Decimal,

    /// Trade size
    pub size: u64,

    /// Return over the reference symbol, in percentage points
    pub relative_strength: Decimal,

    /// Trade time of the triggering tick
    pub timestamp: DateTime<Utc>,
}

impl EntrySignal {
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        size: u64,
        relative_strength: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            price,
            size,
            relative_strength,
            timestamp,
        }
    }
}

/// Which entry gate a tick failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No reference tick seen yet
    ReferenceNotReady,
    /// Trade time outside the target window
    OutsideWindow,
    /// Relative strength below threshold
    WeakRelativeStrength(Decimal),
    /// Trade size below threshold
    LowVolume(u64),
    /// Price does not exceed every recent price, or too little history
    NoMomentum,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ReferenceNotReady => write!(f, "reference price not ready"),
            RejectReason::OutsideWindow => write!(f, "outside target window"),
            RejectReason::WeakRelativeStrength(rs) => {
                write!(f, "relative strength {} below threshold", rs.round_dp(2))
            }
            RejectReason::LowVolume(size) => write!(f, "size {} below threshold", size),
            RejectReason::NoMomentum => write!(f, "no upward momentum"),
        }
    }
}

/// Outcome of evaluating one tick
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Entry(EntrySignal),
    Rejected(RejectReason),
}

impl Evaluation {
    pub fn is_entry(&self) -> bool {
        matches!(self, Evaluation::Entry(_))
    }

    /// The signal, if this evaluation is an entry
    pub fn into_signal(self) -> Option<EntrySignal> {
        match self {
            Evaluation::Entry(signal) => Some(signal),
            Evaluation::Rejected(_) => None,
        }
    }
}

/// Errors raised while evaluating a tick
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Base price must be positive to compute returns
    #[error("invalid base price {price} for {symbol}")]
    InvalidBasePrice { symbol: String, price: Decimal },

    /// Decimal arithmetic overflowed
    #[error("arithmetic overflow computing relative strength for {symbol}")]
    Overflow { symbol: String },
}
