//! CLI interface for momentum-scanner
//!
//! Provides subcommands for:
//! - `run`: Start the scanner pipeline
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "momentum-scanner")]
#[command(about = "Streaming momentum scanner for real-time trade ticks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the scanner
    Run(RunArgs),
    /// Show configuration (credential redacted)
    Config,
}
