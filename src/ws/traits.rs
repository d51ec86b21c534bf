//! Caller-facing callbacks of a session.

use super::transport::CloseFrame;
use crate::error::Error;

/// Receives everything a session reports to its owner.
///
/// Only [`on_message`](Self::on_message) is required. Every callback runs on the
/// session's own task, one at a time, so implementations may keep plain mutable
/// state. Callbacks should return quickly: while one runs, the session cannot
/// answer heartbeats or process closes.
///
/// Any `FnMut(M)` closure is a handler that ignores everything but messages.
///
/// # Example
///
/// ```
/// use resilient_ws::ws::CloseFrame;
/// use resilient_ws::ws::SessionHandler;
///
/// #[derive(Default)]
/// struct Counter {
///     messages: usize,
///     reconnects: usize,
/// }
///
/// impl SessionHandler<serde_json::Value> for Counter {
///     fn on_message(&mut self, _message: serde_json::Value) {
///         self.messages += 1;
///     }
///
///     fn on_reconnecting(&mut self, _close: &CloseFrame) {
///         self.reconnects += 1;
///     }
/// }
/// ```
pub trait SessionHandler<M>: Send + 'static {
    /// A frame decoded into a message.
    fn on_message(&mut self, message: M);

    /// The transport finished its opening handshake.
    fn on_connected(&mut self) {}

    /// The transport closed and a reconnect has been scheduled.
    fn on_reconnecting(&mut self, _close: &CloseFrame) {}

    /// A frame could not be decoded; it was skipped.
    fn on_decode_error(&mut self, _frame: &str, _error: &serde_json::Error) {}

    /// The session gave up reconnecting and is now closed.
    fn on_terminated(&mut self, _error: &Error) {}
}

impl<M, F> SessionHandler<M> for F
where
    F: FnMut(M) + Send + 'static,
{
    fn on_message(&mut self, message: M) {
        self(message);
    }
}
