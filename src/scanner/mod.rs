//! Momentum scanner
//!
//! Routes bus ticks into momentum engines and wires the whole pipeline
//! together.

mod orchestrator;
mod pipeline;
mod types;

pub use orchestrator::{Orchestrator, ScannerHandle, TickRouter};
pub use pipeline::{Pipeline, PipelineError};
pub use types::BaseReferenceTable;
