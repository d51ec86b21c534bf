//! [`Connector`] backed by `tokio-tungstenite`.
//!
//! Each transport is a spawned task owning one WebSocket stream. Writes and close
//! requests reach it over a channel; everything it observes goes back out on the
//! session's [`EventSender`]. The task is aborted when the handle is dropped,
//! unless a close was requested: then it gets [`CLOSE_LINGER`] to deliver the close
//! frame and read the peer's reply.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WireCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::error::WsError;
use super::transport::{
    CLOSE_NO_STATUS, CloseFrame, Connector, EventSender, Transport, TransportEvent,
};

/// How long a dropped transport may keep running to finish a requested close.
pub const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Opens plain or TLS WebSocket connections.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Transport = WsTransport;

    fn open(&self, endpoint: &Url, events: EventSender) -> WsTransport {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(endpoint.clone(), events, outbound_rx));

        WsTransport {
            outbound_tx,
            task,
            close_requested: false,
        }
    }
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(CloseFrame),
}

/// Handle to a connection task started by [`WsConnector`].
#[derive(Debug)]
pub struct WsTransport {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
    close_requested: bool,
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), WsError> {
        self.outbound_tx
            .send(Outbound::Text(text))
            .map_err(|_e| WsError::ConnectionClosed)
    }

    fn close(&mut self, frame: CloseFrame) {
        self.close_requested |= self.outbound_tx.send(Outbound::Close(frame)).is_ok();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if !self.close_requested {
            self.task.abort();
            return;
        }

        // The queued close frame still has to reach the peer
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.task.abort();
            return;
        };
        let task = self.task.abort_handle();
        runtime.spawn(async move {
            tokio::time::sleep(CLOSE_LINGER).await;
            task.abort();
        });
    }
}

async fn run(
    endpoint: Url,
    events: EventSender,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let close = drive(&endpoint, &events, &mut outbound_rx).await;
    _ = events.send(TransportEvent::Closed(close));
}

/// Connect and pump the stream until it ends, returning how it ended.
async fn drive(
    endpoint: &Url,
    events: &EventSender,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
) -> CloseFrame {
    let ws_stream = match connect_async(endpoint.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Unable to connect: {e:?}");
            _ = events.send(TransportEvent::Error(WsError::Connection(e)));
            return CloseFrame::abnormal();
        }
    };

    _ = events.send(TransportEvent::Opened);
    let (mut write, mut read) = ws_stream.split();
    let mut closing = false;

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    _ = events.send(TransportEvent::Text(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    // Flushes the close reply tungstenite queued for the peer.
                    _ = write.close().await;
                    return frame.map_or_else(
                        || CloseFrame::new(CLOSE_NO_STATUS, ""),
                        |frame| CloseFrame::new(u16::from(frame.code), frame.reason.to_string()),
                    );
                }
                // Binary payloads are not part of the protocol; pings are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    _ = events.send(TransportEvent::Error(WsError::Connection(e)));
                    return CloseFrame::abnormal();
                }
                None => return CloseFrame::abnormal(),
            },
            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        _ = events.send(TransportEvent::Error(WsError::Connection(e)));
                        return CloseFrame::abnormal();
                    }
                }
                Some(Outbound::Close(frame)) => {
                    let wire = WireCloseFrame {
                        code: CloseCode::from(frame.code),
                        reason: frame.reason.into_owned().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(wire))).await {
                        _ = events.send(TransportEvent::Error(WsError::Connection(e)));
                        return CloseFrame::abnormal();
                    }
                    // Keep reading until the peer confirms
                    closing = true;
                }
                None if closing => {
                    // Handle dropped mid-handshake; wait out the reply, bounded by `CLOSE_LINGER`
                    while let Some(Ok(message)) = read.next().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    return CloseFrame::abnormal();
                }
                None => return CloseFrame::abnormal(),
            },
        }
    }
}
