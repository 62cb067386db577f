//! Connection state machine and reconnect policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle of the feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    /// Session failed, about to decide whether to retry
    Error,
    /// Waiting out the backoff before the next attempt
    Reconnecting { attempt: u32 },
    /// Retry budget exhausted or fatal failure; terminal
    Closed,
    /// Stop requested; terminal
    Shutdown,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Shutdown)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Authenticating => write!(f, "authenticating"),
            ConnectionState::Subscribed => write!(f, "subscribed"),
            ConnectionState::Error => write!(f, "error"),
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting({})", attempt),
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every attempt
    #[default]
    Fixed,
    /// Delay doubles per attempt up to `max_delay`
    Exponential,
}

/// Reconnect policy for the feed connector
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Base delay before a reconnection attempt
    pub delay: Duration,
    /// Reconnection attempts allowed after consecutive failures
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Ceiling for exponential backoff
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 5,
            backoff: Backoff::Fixed,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before the given (1-based) attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16);
                self.delay
                    .checked_mul(1u32 << shift)
                    .unwrap_or(self.max_delay)
                    .min(self.max_delay)
            }
        }
    }
}

/// Tracks the connector's state and its consecutive failure count
#[derive(Debug)]
pub struct ConnectionTracker {
    state: ConnectionState,
    failures: u32,
    policy: ReconnectPolicy,
}

impl ConnectionTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            failures: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful subscription
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Reconnection attempts made since the last successful subscription
    pub fn reconnect_attempts(&self) -> u32 {
        self.failures.min(self.policy.max_attempts)
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Move to `next` unless a terminal state has been reached
    pub fn transition(&mut self, next: ConnectionState) {
        if self.state.is_terminal() {
            tracing::debug!(state = %self.state, ignored = %next, "Ignoring transition out of terminal state");
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "Feed state transition");
        if next == ConnectionState::Subscribed {
            self.failures = 0;
        }
        self.state = next;
    }

    /// Whether another connection attempt is allowed
    pub fn can_connect(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Record a failed session and decide what happens next
    ///
    /// Returns the delay before the next reconnection attempt, or `None` once
    /// `max_attempts` reconnections have failed (the tracker is then
    /// permanently `Closed`).
    pub fn on_failure(&mut self) -> Option<Duration> {
        if self.state.is_terminal() {
            return None;
        }
        self.transition(ConnectionState::Error);
        self.failures += 1;

        if self.failures > self.policy.max_attempts {
            self.transition(ConnectionState::Closed);
            return None;
        }

        self.transition(ConnectionState::Reconnecting {
            attempt: self.failures,
        });
        Some(self.policy.delay_for(self.failures))
    }

    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Shutdown {
            tracing::debug!(from = %self.state, "Feed shutting down");
        }
        self.state = ConnectionState::Shutdown;
    }
}
