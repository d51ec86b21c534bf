//! Core WebSocket infrastructure.
//!
//! This module provides the pieces a [`Session`](crate::session::Session) is made
//! of. They are public so custom transports and handlers can be plugged in.
//!
//! # Architecture
//!
//! - [`ConnectionState`]: Where a session is in its lifecycle
//! - [`SessionHandler`]: Trait receiving decoded messages and lifecycle notifications
//! - [`Connector`] / [`Transport`]: The socket a session runs over
//! - [`WsConnector`]: The `tokio-tungstenite` implementation of those traits
//! - [`backoff`]: Doubling reconnect delay with a ceiling, as a `backoff::ExponentialBackoff`
//! - [`frame`]: Newline framing and the PING/PONG literals
//!
//! # Example
//!
//! ```ignore
//! let session = Session::open(
//!     "ws://localhost:8080/socket",
//!     "ticker",
//!     Config::default(),
//!     |message: serde_json::Value| println!("{message}"),
//! )?;
//!
//! session.send(&json!({ "subscribe": "BTC" }))?;
//! session.close().await;
//! ```

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub(crate) mod heartbeat;
pub mod traits;
pub mod transport;
#[cfg(feature = "ws")]
pub mod tungstenite;

pub use config::Config;
pub use connection::ConnectionState;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
pub use transport::{CloseFrame, Connector, EventSender, Transport, TransportEvent};
#[cfg(feature = "ws")]
pub use self::tungstenite::{WsConnector, WsTransport};
