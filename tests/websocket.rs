#![cfg(feature = "ws")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use resilient_ws::Session;
use resilient_ws::ws::transport::{CLOSE_NORMAL, PING_PONG_TIMEOUT};
use resilient_ws::ws::{Config, ConnectionState};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use crate::common::{HandlerEvent, recording};

#[derive(Debug, Clone)]
enum ServerCommand {
    /// Send a text frame to every connected client
    Text(String),
    /// Drop every connection without a close handshake
    Drop,
}

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Reaches ALL connected clients
    command_tx: broadcast::Sender<ServerCommand>,
    /// Text frames received from clients, heartbeat excluded
    received_rx: mpsc::UnboundedReceiver<String>,
    /// One entry per accepted connection
    accepted_rx: mpsc::UnboundedReceiver<()>,
    /// Close frames received from clients
    closes_rx: mpsc::UnboundedReceiver<(u16, String)>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    async fn start() -> Self {
        Self::start_with(true).await
    }

    /// Start a server that swallows PINGs without answering.
    async fn start_silent() -> Self {
        Self::start_with(false).await
    }

    async fn start_with(answer_pings: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (command_tx, _) = broadcast::channel::<ServerCommand>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let (closes_tx, closes_rx) = mpsc::unbounded_channel();

        let broadcast_tx = command_tx.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();
                let received_tx = received_tx.clone();
                let closes_tx = closes_tx.clone();
                let mut command_rx = broadcast_tx.subscribe();
                drop(accepted_tx.send(()));

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) if text == "PING" => {
                                        if answer_pings
                                            && write.send(Message::Text("PONG".into())).await.is_err()
                                        {
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    Some(Ok(Message::Close(frame))) => {
                                        if let Some(frame) = frame {
                                            drop(closes_tx.send((
                                                u16::from(frame.code),
                                                frame.reason.to_string(),
                                            )));
                                        }
                                        drop(write.close().await);
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(ServerCommand::Text(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(ServerCommand::Drop) | Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            received_rx,
            accepted_rx,
            closes_rx,
        }
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Send a message to all connected clients.
    fn send(&self, message: &str) {
        drop(self.command_tx.send(ServerCommand::Text(message.to_owned())));
    }

    /// Sever every open connection.
    fn drop_connections(&self) {
        drop(self.command_tx.send(ServerCommand::Drop));
    }

    async fn wait_accepted(&mut self) {
        timeout(Duration::from_secs(5), self.accepted_rx.recv())
            .await
            .unwrap()
            .unwrap();
    }

    async fn recv_text(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn recv_close(&mut self) -> Option<(u16, String)> {
        timeout(Duration::from_secs(2), self.closes_rx.recv())
            .await
            .ok()
            .flatten()
    }
}

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<HandlerEvent>,
) -> HandlerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

mod session {
    use super::*;

    #[tokio::test]
    async fn receives_messages_from_server() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let _session = Session::open::<Value, _>(
            &server.ws_url("/socket"),
            "receive",
            Config::default(),
            handler,
        )
        .unwrap();

        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        server.send(r#"{"welcome":"hello"}"#);

        assert_eq!(
            next_event(&mut events).await,
            HandlerEvent::Message(json!({"welcome": "hello"}))
        );
    }

    #[tokio::test]
    async fn batched_frame_is_split_per_line() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let _session = Session::open::<Value, _>(
            &server.ws_url("/socket"),
            "batch",
            Config::default(),
            handler,
        )
        .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        server.send("{\"seq\":1}\n{\"seq\":2}\n{\"seq\":3}");

        for seq in 1..=3 {
            assert_eq!(
                next_event(&mut events).await,
                HandlerEvent::Message(json!({"seq": seq}))
            );
        }
    }

    #[tokio::test]
    async fn sent_messages_reach_server() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let session = Session::open::<Value, _>(
            &server.ws_url("/socket"),
            "send",
            Config::default(),
            handler,
        )
        .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        session.send(&json!({"subscribe": ["BTC"]})).unwrap();

        let text = server.recv_text().await.unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"subscribe": ["BTC"]})
        );
    }

    #[tokio::test]
    async fn heartbeat_is_answered_and_hidden() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let mut config = Config::default();
        config.heartbeat.interval = Duration::from_millis(50);
        config.heartbeat.timeout = Duration::from_millis(500);
        let session =
            Session::open::<Value, _>(&server.ws_url("/socket"), "heartbeat", config, handler)
                .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        // Several PING/PONG rounds fit in this window.
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(session.state().is_connected());
        events.try_recv().expect_err("heartbeat leaked to the handler");
        assert!(server.recv_text().await.is_none(), "PING forwarded as payload");
    }

    #[tokio::test]
    async fn heartbeat_timeout_close_reaches_server() {
        let mut server = MockWsServer::start_silent().await;
        let (handler, mut events) = recording();
        let mut config = Config::default();
        config.heartbeat.interval = Duration::from_millis(100);
        config.heartbeat.timeout = Duration::from_millis(100);
        let session =
            Session::open::<Value, _>(&server.ws_url("/socket"), "silent", config, handler)
                .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        let HandlerEvent::Reconnecting(frame) = next_event(&mut events).await else {
            panic!("expected the heartbeat to give up on the connection");
        };
        assert_eq!(frame.reason, PING_PONG_TIMEOUT);

        assert_eq!(
            server.recv_close().await.unwrap(),
            (CLOSE_NORMAL, PING_PONG_TIMEOUT.to_owned())
        );
        assert!(server.recv_text().await.is_none(), "PING forwarded as payload");

        timeout(Duration::from_secs(2), session.close())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reconnects_after_server_drops_connection() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let session = Session::open::<Value, _>(
            &server.ws_url("/socket"),
            "reconnect",
            Config::default(),
            handler,
        )
        .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        server.drop_connections();

        assert!(matches!(
            next_event(&mut events).await,
            HandlerEvent::Reconnecting(_)
        ));
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);
        assert!(session.state().is_connected());

        server.send(r#"{"after":"reconnect"}"#);
        assert_eq!(
            next_event(&mut events).await,
            HandlerEvent::Message(json!({"after": "reconnect"}))
        );
    }

    #[tokio::test]
    async fn close_performs_handshake() {
        let mut server = MockWsServer::start().await;
        let (handler, mut events) = recording();
        let session = Session::open::<Value, _>(
            &server.ws_url("/socket"),
            "close",
            Config::default(),
            handler,
        )
        .unwrap();
        server.wait_accepted().await;
        assert_eq!(next_event(&mut events).await, HandlerEvent::Connected);

        timeout(Duration::from_secs(2), session.close())
            .await
            .unwrap();

        assert_eq!(
            server.recv_close().await.unwrap(),
            (1000, "CLOSE_REQUESTED".to_owned())
        );
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn unreachable_server_keeps_retrying_until_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (handler, mut events) = recording();
        let session = Session::open::<Value, _>(
            &format!("ws://{addr}/socket"),
            "unreachable",
            Config::default(),
            handler,
        )
        .unwrap();

        assert!(matches!(
            next_event(&mut events).await,
            HandlerEvent::Reconnecting(_)
        ));
        assert!(matches!(
            session.state(),
            ConnectionState::ReconnectWait { .. } | ConnectionState::Connecting
        ));

        timeout(Duration::from_secs(2), session.close())
            .await
            .unwrap();
        assert_eq!(session.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn open_keeps_the_parsed_endpoint() {
        let server = MockWsServer::start().await;
        let (handler, _events) = recording();

        let session =
            Session::open::<Value, _>(&server.ws_url(""), "endpoint", Config::default(), handler)
                .unwrap();

        assert_eq!(session.endpoint().as_str(), format!("ws://{}/", server.addr));
        assert_eq!(session.name(), "endpoint");
        session.close().await;
    }

    #[tokio::test]
    async fn open_rejects_non_websocket_scheme() {
        let (handler, _events) = recording();

        let error = Session::open::<Value, _>(
            "http://localhost:1/socket",
            "http",
            Config::default(),
            handler,
        )
        .unwrap_err();

        assert_eq!(error.kind(), resilient_ws::error::Kind::Validation);
    }
}
