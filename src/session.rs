//! The caller-facing handle of a resilient WebSocket connection.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use url::Url;
use uuid::Uuid;

use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::connection::{Command, ConnectionState, Lifecycle};
use crate::ws::traits::SessionHandler;
use crate::ws::transport::Connector;
#[cfg(feature = "ws")]
use crate::ws::tungstenite::WsConnector;

/// A long-lived connection that reconnects by itself until closed.
///
/// The connection is driven by a background task spawned on the current Tokio
/// runtime. Inbound frames are decoded as `M` and delivered to the
/// [`SessionHandler`] given at open time. Dropping every handle has the same effect
/// as [`Session::close`] without waiting for it.
///
/// # Example
///
/// ```no_run
/// use resilient_ws::Session;
/// use resilient_ws::ws::Config;
///
/// # async fn run() -> resilient_ws::Result<()> {
/// let session = Session::open(
///     "ws://localhost:8080/socket",
///     "ticker",
///     Config::default(),
///     |message: serde_json::Value| {
///         let _ = message;
///     },
/// )?;
///
/// session.send(&serde_json::json!({ "subscribe": "BTC" }))?;
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    name: String,
    endpoint: Url,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Session {
    /// Open a session over a real WebSocket and start connecting.
    ///
    /// Must be called within a Tokio runtime. Fails only when `endpoint` is not a
    /// `ws`/`wss` URL or `config` does not validate; connection failures are retried
    /// in the background.
    #[cfg(feature = "ws")]
    pub fn open<M, H>(endpoint: &str, name: &str, config: Config, handler: H) -> Result<Self>
    where
        M: DeserializeOwned + 'static,
        H: SessionHandler<M>,
    {
        let endpoint = Url::parse(endpoint)?;
        require_ws_scheme(&endpoint)?;

        Self::spawn(WsConnector, endpoint, name, config, handler)
    }

    /// Open a session over transports produced by `connector`.
    pub fn open_with<M, C, H>(
        connector: C,
        endpoint: &str,
        name: &str,
        config: Config,
        handler: H,
    ) -> Result<Self>
    where
        M: DeserializeOwned + 'static,
        C: Connector,
        H: SessionHandler<M>,
    {
        Self::spawn(connector, Url::parse(endpoint)?, name, config, handler)
    }

    fn spawn<M, C, H>(
        connector: C,
        endpoint: Url,
        name: &str,
        config: Config,
        handler: H,
    ) -> Result<Self>
    where
        M: DeserializeOwned + 'static,
        C: Connector,
        H: SessionHandler<M>,
    {
        config.validate()?;
        let id = Uuid::new_v4();

        let (lifecycle, commands, state_rx) = Lifecycle::<C, H, M>::new(
            id,
            name.to_owned(),
            endpoint.clone(),
            config,
            connector,
            handler,
        );
        tokio::spawn(lifecycle.run());

        Ok(Self {
            id,
            name: name.to_owned(),
            endpoint,
            commands,
            state_rx,
        })
    }

    /// Serialize `request` as JSON and send it.
    ///
    /// Only a serialization failure is an error. Messages sent while the session is
    /// not open are dropped, not queued.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let text = serde_json::to_string(request)?;
        self.send_text(text);
        Ok(())
    }

    /// Send a raw text payload. Dropped unless the session is open.
    pub fn send_text<S: Into<String>>(&self, text: S) {
        _ = self.commands.send(Command::Send(text.into()));
    }

    /// Request closure and wait until the session has fully shut down.
    ///
    /// Stops reconnecting, closes the transport and waits for it to confirm, or for
    /// the close fallback to fire. Calling this again, from any clone, returns once
    /// the session is closed.
    pub async fn close(&self) {
        _ = self.commands.send(Command::Disconnect);

        // The background task owns the only sender; it is dropped on exit.
        let mut state_rx = self.state_rx.clone();
        while state_rx.changed().await.is_ok() {}
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Unique identifier of this session, also attached to its log span.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name given at open time, used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL every connection attempt of this session dials.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Build a session endpoint from a base URL, a path and query parameters.
///
/// ```
/// use resilient_ws::session::endpoint;
///
/// let url = endpoint("wss://example.com/", "/socket", &[("name", "ticker")])?;
///
/// assert_eq!(url.as_str(), "wss://example.com/socket?name=ticker");
/// # Ok::<(), resilient_ws::error::Error>(())
/// ```
pub fn endpoint<K, V>(base: &str, path: &str, params: &[(K, V)]) -> Result<Url>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&joined)?;
    require_ws_scheme(&url)?;

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(
            params
                .iter()
                .map(|(key, value)| (key.as_ref(), value.as_ref())),
        );
    }

    Ok(url)
}

fn require_ws_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::validation(format!(
            "unsupported endpoint scheme `{other}`, expected ws or wss"
        ))),
    }
}
