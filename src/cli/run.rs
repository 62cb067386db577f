//! Run command implementation

use crate::bus;
use crate::config::Config;
use crate::momentum::EntrySignal;
use crate::scanner::Pipeline;
use crate::shutdown;
use anyhow::Context;
use clap::Args;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many seconds
    #[arg(long)]
    pub max_runtime_secs: Option<u64>,

    /// Buffered entry signals before new ones are dropped
    #[arg(long, default_value_t = 256)]
    pub signal_buffer: usize,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        config.validate().context("Invalid configuration")?;

        let broker = bus::broker_for(&config.bus).context("Invalid bus settings")?;
        let (stop_tx, stop_rx) = shutdown::channel();
        let (signal_tx, signal_rx) = mpsc::channel(self.signal_buffer.max(1));

        let consumer = tokio::spawn(consume_signals(signal_rx));

        let max_runtime = self.max_runtime_secs.map(Duration::from_secs);
        let waiter = tokio::spawn(async move {
            wait_for_termination(max_runtime).await;
            let _ = stop_tx.send(true);
        });

        let result = Pipeline::new(config, broker).run(stop_rx, signal_tx).await;

        waiter.abort();
        let signals = consumer.await.unwrap_or(0);
        tracing::info!(signals, "Scanner exited");

        result.context("Scanner pipeline failed")
    }
}

/// Execution hook: currently records each signal
async fn consume_signals(mut rx: mpsc::Receiver<EntrySignal>) -> u64 {
    let mut count = 0;
    while let Some(signal) = rx.recv().await {
        count += 1;
        tracing::info!(
            id = %signal.id,
            symbol = %signal.symbol,
            price = %signal.price,
            size = signal.size,
            relative_strength = %signal.relative_strength.round_dp(2),
            "SIGNAL: buy {} at {}",
            signal.symbol,
            signal.price.round_dp(2)
        );
    }
    count
}

/// Ctrl-C, SIGTERM or the runtime limit, whichever comes first
async fn wait_for_termination(max_runtime: Option<Duration>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let deadline = async {
        match max_runtime {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = deadline => tracing::info!("Max runtime reached"),
    }
}
