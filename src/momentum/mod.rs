//! Momentum engine
//!
//! Per-tick entry evaluation: relative strength against a reference symbol,
//! trade size, the intraday target window and short-term upward momentum.

mod engine;
mod history;
mod types;

pub use engine::{relative_strength, MomentumConfig, MomentumEngine, ReferencePrice, TargetWindow};
pub use history::SymbolHistory;
pub use types::{EngineError, EntrySignal, Evaluation, RejectReason};
