#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::future::pending;
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::{Duration, Instant};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::{Sleep, sleep};
use url::Url;
use uuid::Uuid;

use super::config::Config;
use super::error::WsError;
use super::frame::{self, Frame, PING};
use super::heartbeat::{Expiry, Heartbeat};
use super::traits::SessionHandler;
use super::transport::{
    CLOSE_NORMAL, CloseFrame, Connector, PING_PONG_TIMEOUT, Transport as _, TransportEvent,
};
use crate::error::Error;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not yet asked to connect
    Idle,
    /// Transport created, opening handshake pending
    Connecting,
    /// Handshake complete, heartbeat running
    Open {
        /// When the connection was established
        since: Instant,
    },
    /// Waiting out the backoff before the next connection attempt
    ReconnectWait {
        /// Reconnects scheduled since the last successful open
        attempt: u32,
        /// How long this wait lasts
        delay: Duration,
    },
    /// Close requested, waiting for the transport to confirm
    Closing,
    /// Terminal; nothing further will happen
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Check if the session has finished.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Request from a session handle to its lifecycle task.
#[derive(Debug)]
pub(crate) enum Command {
    Send(String),
    Disconnect,
}

/// A transport together with the receiving end of its event channel.
///
/// Dropping a link detaches the session from the transport's events and releases
/// the transport itself.
struct Link<T> {
    transport: T,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// State machine driving one session's transports, timers and caller commands.
///
/// Every transition runs on the task executing [`Lifecycle::run`], one event at a
/// time. Timers are owned fields; replacing or clearing a field cancels the timer.
pub(crate) struct Lifecycle<C: Connector, H, M> {
    id: Uuid,
    name: String,
    endpoint: Url,
    config: Config,
    connector: C,
    handler: H,
    link: Option<Link<C::Transport>>,
    /// Set once by `disconnect` (or by giving up); never cleared
    close_requested: bool,
    /// `current_interval` is the delay of the next reconnect
    backoff: ExponentialBackoff,
    attempt: u32,
    heartbeat: Heartbeat,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    fallback_timer: Option<Pin<Box<Sleep>>>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    _message: PhantomData<fn() -> M>,
}

impl<C, H, M> Lifecycle<C, H, M>
where
    C: Connector,
    H: SessionHandler<M>,
    M: DeserializeOwned + 'static,
{
    /// Build a lifecycle together with the command sender and state receiver the
    /// session handle keeps.
    pub(crate) fn new(
        id: Uuid,
        name: String,
        endpoint: Url,
        config: Config,
        connector: C,
        handler: H,
    ) -> (
        Self,
        mpsc::UnboundedSender<Command>,
        watch::Receiver<ConnectionState>,
    ) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let lifecycle = Self {
            id,
            name,
            endpoint,
            backoff: ExponentialBackoff::from(&config.reconnect),
            heartbeat: Heartbeat::new(&config.heartbeat),
            config,
            connector,
            handler,
            link: None,
            close_requested: false,
            attempt: 0,
            reconnect_timer: None,
            fallback_timer: None,
            commands,
            state_tx,
            _message: PhantomData,
        };

        (lifecycle, commands_tx, state_rx)
    }

    /// Connect, then process events until the session is closed.
    ///
    /// Returning drops every timer and the transport, which is what the session
    /// handle waits for when closing.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            level = "info",
            name = "session",
            skip_all,
            fields(name = %self.name, id = %self.id)
        )
    )]
    pub(crate) async fn run(mut self) {
        self.connect();

        while !self.state().is_closed() {
            tokio::select! {
                biased;

                // Transport events first, so a queued PONG beats its own deadline
                event = next_event(self.link.as_mut()) => self.on_event(event),
                command = self.commands.recv(), if !self.close_requested => match command {
                    Some(Command::Send(text)) => self.send(text),
                    // All session handles are gone; nobody can close us otherwise
                    Some(Command::Disconnect) | None => self.disconnect(),
                },
                expiry = self.heartbeat.expired() => self.on_heartbeat(expiry),
                () = expire(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.connect();
                }
                () = expire(&mut self.fallback_timer) => {
                    self.fallback_timer = None;
                    self.on_close_fallback();
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        // `send_replace` updates the value even when every receiver is gone.
        self.state_tx.send_replace(state);
    }

    fn connect(&mut self) {
        if self.link.is_some() {
            #[cfg(feature = "tracing")]
            tracing::warn!("Called connect with a transport already in place");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(endpoint = %self.endpoint, "Connecting");

        let (events_tx, events) = mpsc::unbounded_channel();
        let transport = self.connector.open(&self.endpoint, events_tx);
        self.link = Some(Link { transport, events });
        self.set_state(ConnectionState::Connecting);
    }

    fn disconnect(&mut self) {
        if self.close_requested {
            return;
        }

        // Flag and timers change in the same turn so nothing scheduled earlier can fire.
        self.close_requested = true;
        self.reconnect_timer = None;
        self.heartbeat.stop();

        if let Some(link) = self.link.as_mut() {
            #[cfg(feature = "tracing")]
            tracing::info!("Close requested");

            link.transport.close(CloseFrame::requested());
            self.fallback_timer = Some(Box::pin(sleep(self.config.close_fallback)));
            self.set_state(ConnectionState::Closing);
        } else {
            #[cfg(feature = "tracing")]
            tracing::info!("Close requested with no transport open, closed");

            self.set_state(ConnectionState::Closed);
        }
    }

    fn send(&mut self, text: String) {
        if !self.state().is_connected() {
            #[cfg(feature = "tracing")]
            tracing::debug!(%text, "Dropping outbound message, session is not connected");
            return;
        }

        if let Some(link) = self.link.as_mut()
            && let Err(e) = link.transport.send(text)
        {
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %e, "Unable to send outbound message");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Text(text) => self.on_text(&text),
            TransportEvent::Error(e) => self.on_error(&e),
            TransportEvent::Closed(frame) => self.on_close(frame),
        }
    }

    fn on_open(&mut self) {
        if self.close_requested {
            #[cfg(feature = "tracing")]
            tracing::debug!("Ignoring open, close already requested");
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Opened");

        self.backoff.reset();
        self.attempt = 0;
        self.heartbeat.arm();
        self.set_state(ConnectionState::Open {
            since: Instant::now(),
        });
        self.handler.on_connected();
    }

    fn on_text(&mut self, text: &str) {
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received WebSocket text message");

        for frame in frame::split(text) {
            match frame {
                Frame::Pong => {
                    let cancelled = self.heartbeat.pong_received();
                    #[cfg(feature = "tracing")]
                    tracing::trace!(cancelled, "Received PONG");
                    #[cfg(not(feature = "tracing"))]
                    let _ = cancelled;
                }
                Frame::Payload(line) => match serde_json::from_str::<M>(line) {
                    Ok(message) => self.handler.on_message(message),
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            frame = %line,
                            error = %e,
                            "Failed to parse WebSocket message"
                        );
                        self.handler.on_decode_error(line, &e);
                    }
                },
            }
        }
    }

    fn on_error(&mut self, error: &WsError) {
        // Only the grown `current_interval` matters, the returned value is discarded
        _ = self.backoff.next_backoff();
        let delay = self.backoff.current_interval;

        #[cfg(feature = "tracing")]
        tracing::warn!(%error, next_delay = ?delay, "Transport error");
        #[cfg(not(feature = "tracing"))]
        let _ = (error, delay);
    }

    fn on_heartbeat(&mut self, expiry: Expiry) {
        match expiry {
            Expiry::PingDue => {
                if let Some(link) = self.link.as_mut()
                    && let Err(e) = link.transport.send(PING.to_owned())
                {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %e, "Unable to send PING");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
                self.heartbeat.ping_sent();
            }
            Expiry::PongMissed => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Heartbeat timeout: no PONG received within {:?}",
                    self.config.heartbeat.timeout
                );

                if let Some(link) = self.link.as_mut() {
                    link.transport
                        .close(CloseFrame::new(CLOSE_NORMAL, PING_PONG_TIMEOUT));
                }
                self.on_close(CloseFrame::ping_pong_timeout());
            }
        }
    }

    fn on_close_fallback(&mut self) {
        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Transport did not confirm close within {:?}, tearing down",
            self.config.close_fallback
        );

        self.on_close(CloseFrame::requested_fallback());
    }

    /// The one place a close is handled, whatever produced it.
    fn on_close(&mut self, frame: CloseFrame) {
        self.link = None;
        self.fallback_timer = None;
        self.heartbeat.stop();

        if self.close_requested {
            #[cfg(feature = "tracing")]
            tracing::info!(close = %frame, "Closed");

            self.set_state(ConnectionState::Closed);
            return;
        }

        if let Some(max) = self.config.reconnect.max_attempts
            && self.attempt >= max
        {
            let error = Error::from(WsError::ReconnectExhausted {
                attempts: self.attempt,
            });

            #[cfg(feature = "tracing")]
            tracing::warn!(close = %frame, %error, "Giving up on reconnecting");

            self.close_requested = true;
            self.set_state(ConnectionState::Closed);
            self.handler.on_terminated(&error);
            return;
        }

        self.attempt = self.attempt.saturating_add(1);
        let delay = self.backoff.current_interval;

        #[cfg(feature = "tracing")]
        tracing::info!(close = %frame, ?delay, attempt = self.attempt, "Reconnecting");

        self.handler.on_reconnecting(&frame);
        self.reconnect_timer = Some(Box::pin(sleep(delay)));
        self.set_state(ConnectionState::ReconnectWait {
            attempt: self.attempt,
            delay,
        });
    }
}

/// Next event of the current transport; pending forever when there is none.
///
/// A transport whose event channel ends without a close reads as an abnormal close.
async fn next_event<T>(link: Option<&mut Link<T>>) -> TransportEvent {
    match link {
        Some(link) => link
            .events
            .recv()
            .await
            .unwrap_or_else(|| TransportEvent::Closed(CloseFrame::abnormal())),
        None => pending().await,
    }
}

async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
