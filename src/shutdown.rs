//! Process-wide stop flag
//!
//! A `watch<bool>` that flips to `true` once. Every long-running task holds a
//! receiver and checks it at each loop iteration.

use tokio::sync::watch;

pub type StopSender = watch::Sender<bool>;
pub type StopSignal = watch::Receiver<bool>;

/// New stop flag, initially clear
pub fn channel() -> (StopSender, StopSignal) {
    watch::channel(false)
}

/// Resolves once a stop is requested or every sender is gone
pub async fn requested(signal: &mut StopSignal) {
    let _ = signal.wait_for(|stop| *stop).await;
}
