#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    #[cfg(feature = "ws")]
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Failure reported by a custom [`Transport`](super::transport::Transport) implementation
    Transport(Box<dyn StdError + Send + Sync + 'static>),
    /// The transport is gone and can no longer accept writes
    ConnectionClosed,
    /// Reconnection was abandoned after the configured number of attempts
    ReconnectExhausted {
        /// Number of reconnects scheduled since the last successful open
        attempts: u32,
    },
}

impl WsError {
    /// Wrap an arbitrary transport failure.
    pub fn transport<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Transport(Box::new(error))
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket connection closed"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "Gave up reconnecting after {attempts} attempts")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            #[cfg(feature = "ws")]
            Self::Connection(e) => Some(e),
            Self::Transport(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

#[cfg(feature = "ws")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
