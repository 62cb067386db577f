//! End-to-end pipeline wiring
//!
//! Broker, bus, orchestrator and feed connector, started in dependency order
//! and torn down in reverse once a stop is requested or the feed gives up.

use super::orchestrator::Orchestrator;
use super::types::BaseReferenceTable;
use crate::bus::{Broker, BusError, TickBus, TickPublisher};
use crate::config::{Config, ConfigError};
use crate::feed::{FeedError, PolygonFeed};
use crate::momentum::EntrySignal;
use crate::shutdown::{self, StopSignal};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("feed task panicked")]
    FeedPanicked,
}

/// The assembled scanner
pub struct Pipeline {
    config: Config,
    broker: Arc<dyn Broker>,
}

impl Pipeline {
    pub fn new(config: Config, broker: Arc<dyn Broker>) -> Self {
        Self { config, broker }
    }

    /// Run until `stop` is raised or the feed connector fails
    ///
    /// Returns `Ok` for a requested stop and the connector's error if it gave
    /// up. Either way every task is joined and the bus closed before returning.
    pub async fn run(
        self,
        mut stop: StopSignal,
        signals: mpsc::Sender<EntrySignal>,
    ) -> Result<(), PipelineError> {
        self.config.validate()?;
        let api_key = self.config.api_key()?.to_string();

        let base_prices = BaseReferenceTable::from_prices(&self.config.scanner.base_prices);
        let reference = self.config.scanner.reference();
        for ticker in self.config.feed_symbols() {
            if ticker != reference && !base_prices.contains(&ticker) {
                tracing::warn!(%ticker, "Tracked ticker has no base price and will not be evaluated");
            }
        }

        let bus = Arc::new(TickBus::connect(Arc::clone(&self.broker), self.config.bus.clone()).await?);
        let (internal_tx, internal_rx) = shutdown::channel();

        let orchestrator = Orchestrator::new(Arc::clone(&bus), &self.config.scanner);
        let scanner = orchestrator.start(internal_rx.clone(), signals).await?;

        let feed = PolygonFeed::new(&self.config.feed, api_key, self.config.feed_symbols())?;
        let publisher: Arc<dyn TickPublisher> = bus.clone();
        let mut feed_task = tokio::spawn(feed.run(publisher, internal_rx));

        let feed_result = tokio::select! {
            joined = &mut feed_task => Some(joined),
            _ = shutdown::requested(&mut stop) => {
                tracing::info!("Stop requested, shutting down pipeline");
                None
            }
        };

        // The internal flag fans the stop out to the feed and every worker
        let _ = internal_tx.send(true);
        let feed_result = match feed_result {
            Some(joined) => joined,
            None => feed_task.await,
        };

        let handled = scanner.join().await;
        bus.close().await;
        tracing::info!(ticks = handled, "Pipeline stopped");

        match feed_result {
            Ok(result) => result.map_err(PipelineError::from),
            Err(e) => {
                tracing::error!(error = %e, "Feed task failed");
                Err(PipelineError::FeedPanicked)
            }
        }
    }
}
