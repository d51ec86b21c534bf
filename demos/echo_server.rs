//! Minimal server to run the client demo against.
//!
//! Answers every `PING` with `PONG`, greets each client with a JSON welcome message
//! and broadcasts every line typed on stdin to all clients. Stop and restart it to
//! watch clients reconnect.
//!
//! ```sh
//! RUST_LOG=info cargo run --example echo_server
//! ```
//!
//! Set `ADDR` to listen somewhere other than `127.0.0.1:8080`.

use futures::{SinkExt as _, StreamExt as _};
use serde_json::json;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    let (broadcast_tx, _) = broadcast::channel::<String>(100);

    let stdin_tx = broadcast_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let payload = json!({ "received": line }).to_string();
            let clients = stdin_tx.send(payload).unwrap_or_default();
            info!(clients, "Broadcast stdin line");
        }
    });

    loop {
        let (stream, peer) = listener.accept().await?;
        let rx = broadcast_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = serve(stream, rx).await {
                warn!(%peer, error = %e, "Connection failed");
            }
            info!(%peer, "Disconnected");
        });
    }
}

async fn serve(
    stream: TcpStream,
    mut broadcast_rx: broadcast::Receiver<String>,
) -> anyhow::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let welcome = json!({ "type": "welcome", "message": "connected to echo_server" });
    write.send(Message::Text(welcome.to_string().into())).await?;

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) if text == "PING" => {
                    debug!("PING");
                    write.send(Message::Text("PONG".into())).await?;
                }
                Some(Ok(Message::Text(text))) => {
                    info!(%text, "Received");
                    let echo = json!({ "echo": text.as_str() });
                    write.send(Message::Text(echo.to_string().into())).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Client closed");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            line = broadcast_rx.recv() => match line {
                Ok(line) => write.send(Message::Text(line.into())).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client lagging behind broadcast");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}
