//! The capability set a session needs from the underlying message socket.
//!
//! A [`Connector`] opens transports; a [`Transport`] accepts writes and close
//! requests. Everything the transport observes flows back to the session as
//! [`TransportEvent`]s on the channel handed to [`Connector::open`]. Dropping the
//! receiving end of that channel is how a session detaches from a transport.

#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types include the module name to indicate their scope"
)]

use std::borrow::Cow;
use std::fmt;

use tokio::sync::mpsc;
use url::Url;

use super::error::WsError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// The peer closed without giving a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Closure without a close frame. Only ever synthesized locally, never sent.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Reason sent with a caller-initiated close.
pub const CLOSE_REQUESTED: &str = "CLOSE_REQUESTED";
/// Reason of the close synthesized when a requested close is never confirmed.
pub const CLOSE_REQUESTED_FALLBACK: &str = "CLOSE_REQUESTED_FALLBACK";
/// Reason of the close synthesized when the peer stops answering PINGs.
pub const PING_PONG_TIMEOUT: &str = "PING_PONG_TIMEOUT";

/// Close code and reason, whether received from the peer or synthesized locally.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: Cow<'static, str>,
}

impl CloseFrame {
    pub fn new<R: Into<Cow<'static, str>>>(code: u16, reason: R) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The close a caller asks for when ending the session.
    #[must_use]
    pub const fn requested() -> Self {
        Self {
            code: CLOSE_NORMAL,
            reason: Cow::Borrowed(CLOSE_REQUESTED),
        }
    }

    /// Stand-in for a close the transport never confirmed.
    #[must_use]
    pub const fn requested_fallback() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: Cow::Borrowed(CLOSE_REQUESTED_FALLBACK),
        }
    }

    /// Stand-in for the close of a connection that stopped answering PINGs.
    #[must_use]
    pub const fn ping_pong_timeout() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: Cow::Borrowed(PING_PONG_TIMEOUT),
        }
    }

    /// The transport went away without a close frame.
    #[must_use]
    pub const fn abnormal() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: Cow::Borrowed(""),
        }
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Something the transport observed.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// The opening handshake completed
    Opened,
    /// A text payload arrived
    Text(String),
    /// The transport failed. A [`TransportEvent::Closed`] usually follows, but
    /// sessions must not rely on it.
    Error(WsError),
    /// The transport is closed and will emit nothing further
    Closed(CloseFrame),
}

/// Sending half of a transport's event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// A live (or opening) message socket, exclusively owned by one session.
///
/// Dropping the handle must release every resource the transport holds.
pub trait Transport: Send + 'static {
    /// Queue a text payload for the peer.
    fn send(&mut self, text: String) -> Result<(), WsError>;

    /// Ask the transport to close. Confirmation, if it ever comes, arrives as
    /// [`TransportEvent::Closed`].
    fn close(&mut self, frame: CloseFrame);
}

/// Factory for transports.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Begin opening a transport to `endpoint` and return immediately.
    ///
    /// Progress is reported on `events`, starting with [`TransportEvent::Opened`] or
    /// with [`TransportEvent::Error`] followed by [`TransportEvent::Closed`].
    fn open(&self, endpoint: &Url, events: EventSender) -> Self::Transport;
}
