#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use crate::Result;
use crate::error::Error;

const DEFAULT_PING_INTERVAL_DURATION: Duration = Duration::from_millis(5000);
const DEFAULT_PONG_TIMEOUT_DURATION: Duration = Duration::from_millis(2000);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_millis(300);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_millis(5000);
const DEFAULT_CLOSE_FALLBACK_DURATION: Duration = Duration::from_millis(5000);

/// Configuration for a WebSocket session.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Client-side PING/PONG liveness check
    pub heartbeat: HeartbeatConfig,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// How long to wait for the transport to confirm a requested close before
    /// tearing the session down anyway
    pub close_fallback: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            close_fallback: DEFAULT_CLOSE_FALLBACK_DURATION,
        }
    }
}

impl Config {
    /// Check the configuration for values the session cannot operate with.
    ///
    /// Called by [`Session::open`](crate::session::Session::open) before anything is spawned.
    pub fn validate(&self) -> Result<()> {
        self.heartbeat.validate()?;
        self.reconnect.validate()?;

        if self.close_fallback.is_zero() {
            return Err(Error::validation("close_fallback must be greater than zero"));
        }

        Ok(())
    }
}

/// Timing of the PING/PONG exchange.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Quiet time after an open or a PONG before the next PING is sent
    pub interval: Duration,
    /// Maximum time to wait for PONG response before considering connection dead
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL_DURATION,
            timeout: DEFAULT_PONG_TIMEOUT_DURATION,
        }
    }
}

impl HeartbeatConfig {
    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::validation("heartbeat interval must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(Error::validation("heartbeat timeout must be greater than zero"));
        }

        Ok(())
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay before the first reconnection attempt, and after every successful open
    pub initial_backoff: Duration,
    /// Ceiling the delay never grows past
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
        }
    }
}

impl ReconnectConfig {
    fn validate(&self) -> Result<()> {
        if self.initial_backoff.is_zero() {
            return Err(Error::validation("initial_backoff must be greater than zero"));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(Error::validation(format!(
                "max_backoff ({:?}) must not be below initial_backoff ({:?})",
                self.max_backoff, self.initial_backoff
            )));
        }

        Ok(())
    }
}
