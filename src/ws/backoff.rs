//! Reconnect delay policy.
//!
//! The delay doubles on every transport error and snaps back to its initial value on
//! every successful open. Randomization is disabled: a session that keeps failing
//! walks the same `initial, 2·initial, 4·initial, …, ceiling` sequence every time.
//!
//! The policy is a plain [`ExponentialBackoff`]. Its `current_interval` is the delay
//! the next reconnect waits for; `next_backoff()` grows it and `reset()` restores it.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use super::config::ReconnectConfig;

/// Factor applied to the delay on every transport error.
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

impl From<&ReconnectConfig> for ExponentialBackoff {
    fn from(config: &ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(BACKOFF_MULTIPLIER)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // Attempts are limited by the session instead
            .build()
    }
}
