#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary only uses some of the helpers"
)]

use std::time::Duration;

use resilient_ws::error::Error;
use resilient_ws::ws::{
    CloseFrame, Connector, EventSender, SessionHandler, Transport, TransportEvent, WsError,
};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

pub const URL: &str = "ws://mock.invalid/socket";

/// What a session wrote to a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close(CloseFrame),
}

/// Connector handing every transport it opens to the test as a [`MockLink`].
pub struct MockConnector {
    links_tx: mpsc::UnboundedSender<MockLink>,
}

/// Test side of one transport: inject events, observe writes.
pub struct MockLink {
    pub endpoint: Url,
    pub events: EventSender,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

pub struct MockTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for MockTransport {
    fn send(&mut self, text: String) -> Result<(), WsError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_e| WsError::ConnectionClosed)
    }

    fn close(&mut self, frame: CloseFrame) {
        drop(self.outbound.send(Outbound::Close(frame)));
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn open(&self, endpoint: &Url, events: EventSender) -> MockTransport {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        drop(self.links_tx.send(MockLink {
            endpoint: endpoint.clone(),
            events,
            outbound,
        }));

        MockTransport {
            outbound: outbound_tx,
        }
    }
}

/// Create a connector and the receiver yielding each transport it opens.
#[must_use]
pub fn connector() -> (MockConnector, mpsc::UnboundedReceiver<MockLink>) {
    let (links_tx, links_rx) = mpsc::unbounded_channel();
    (MockConnector { links_tx }, links_rx)
}

impl MockLink {
    pub fn open(&self) {
        self.events.send(TransportEvent::Opened).unwrap();
    }

    pub fn text(&self, text: &str) {
        self.events
            .send(TransportEvent::Text(text.to_owned()))
            .unwrap();
    }

    pub fn error(&self) {
        self.events
            .send(TransportEvent::Error(WsError::ConnectionClosed))
            .unwrap();
    }

    pub fn close(&self, frame: CloseFrame) {
        self.events.send(TransportEvent::Closed(frame)).unwrap();
    }

    /// Simulate a failed connection attempt the way real transports report one.
    pub fn fail(&self) {
        self.error();
        self.close(CloseFrame::abnormal());
    }

    /// The next write, or `None` once the session released the transport.
    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound.recv().await
    }

    /// Whether the session stopped listening to this transport.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }
}

/// Everything a session reported to its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerEvent {
    Connected,
    Message(Value),
    Reconnecting(CloseFrame),
    DecodeError(String),
    Terminated(String),
}

pub struct Recording {
    tx: mpsc::UnboundedSender<HandlerEvent>,
}

impl Recording {
    fn record(&self, event: HandlerEvent) {
        drop(self.tx.send(event));
    }
}

impl SessionHandler<Value> for Recording {
    fn on_message(&mut self, message: Value) {
        self.record(HandlerEvent::Message(message));
    }

    fn on_connected(&mut self) {
        self.record(HandlerEvent::Connected);
    }

    fn on_reconnecting(&mut self, close: &CloseFrame) {
        self.record(HandlerEvent::Reconnecting(close.clone()));
    }

    fn on_decode_error(&mut self, frame: &str, _error: &serde_json::Error) {
        self.record(HandlerEvent::DecodeError(frame.to_owned()));
    }

    fn on_terminated(&mut self, error: &Error) {
        self.record(HandlerEvent::Terminated(error.to_string()));
    }
}

#[must_use]
pub fn recording() -> (Recording, mpsc::UnboundedReceiver<HandlerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Recording { tx }, rx)
}

/// Let every runnable task process what is already queued.
///
/// Under paused time this returns without moving the clock past any pending timer.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
