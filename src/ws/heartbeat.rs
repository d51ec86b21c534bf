//! Client-side PING/PONG liveness monitoring.
//!
//! The monitor owns at most one deadline at a time: either it is waiting for the
//! quiet period to end so a PING can go out, or it is waiting for the PONG that
//! answers it. Both live in the same [`Phase`] field so they can never overlap.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};

use super::config::HeartbeatConfig;

/// What the expired deadline asks the session to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    /// The quiet period ended; send a PING now
    PingDue,
    /// No PONG arrived in time; treat the connection as dead
    PongMissed,
}

#[derive(Debug)]
enum Phase {
    Stopped,
    AwaitingPing(Pin<Box<Sleep>>),
    AwaitingPong(Pin<Box<Sleep>>),
}

#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    phase: Phase,
}

impl Heartbeat {
    pub(crate) fn new(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
            phase: Phase::Stopped,
        }
    }

    /// Start (or restart) the cycle: cancel whatever is pending and wait `interval`
    /// before the next PING.
    pub(crate) fn arm(&mut self) {
        self.phase = Phase::AwaitingPing(Box::pin(sleep(self.interval)));
    }

    /// Record that a PING went out; the PONG must arrive within `timeout`.
    pub(crate) fn ping_sent(&mut self) {
        self.phase = Phase::AwaitingPong(Box::pin(sleep(self.timeout)));
    }

    /// Handle a PONG. Returns `true` if it cancelled a pending pong deadline.
    ///
    /// Unsolicited PONGs still restart the cycle, as the peer is evidently alive.
    pub(crate) fn pong_received(&mut self) -> bool {
        let was_waiting = matches!(self.phase, Phase::AwaitingPong(_));
        if !matches!(self.phase, Phase::Stopped) {
            self.arm();
        }
        was_waiting
    }

    /// Cancel any pending deadline.
    pub(crate) fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Stopped)
    }

    /// When the pending deadline fires, if any.
    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match &self.phase {
            Phase::Stopped => None,
            Phase::AwaitingPing(timer) | Phase::AwaitingPong(timer) => Some(timer.deadline()),
        }
    }

    /// Wait for the pending deadline. Never resolves while stopped.
    ///
    /// The monitor stays in its current phase after this resolves; the caller moves
    /// it on with [`Self::ping_sent`] or [`Self::stop`].
    pub(crate) async fn expired(&mut self) -> Expiry {
        match &mut self.phase {
            Phase::Stopped => pending().await,
            Phase::AwaitingPing(timer) => {
                timer.as_mut().await;
                // Park the fired timer so a caller that does not move the phase on
                // does not spin on an already elapsed deadline.
                timer.as_mut().reset(far_future());
                Expiry::PingDue
            }
            Phase::AwaitingPong(timer) => {
                timer.as_mut().await;
                timer.as_mut().reset(far_future());
                Expiry::PongMissed
            }
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400 * 365)
}
