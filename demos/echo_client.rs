//! Session client for the `echo_server` demo.
//!
//! Logs every decoded message and lifecycle event, sends a greeting each time the
//! session connects and forwards every stdin line as `{"line": ...}`. Closes cleanly
//! on end of input or Ctrl-C.
//!
//! ```sh
//! RUST_LOG=info,resilient_ws=debug cargo run --example echo_client
//! ```
//!
//! Set `ENDPOINT` to connect somewhere other than `ws://127.0.0.1:8080`.

use resilient_ws::Session;
use resilient_ws::error::Error;
use resilient_ws::session::endpoint;
use resilient_ws::ws::{CloseFrame, Config, SessionHandler};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Default)]
struct Logger {
    received: u64,
}

impl SessionHandler<Value> for Logger {
    fn on_message(&mut self, message: Value) {
        self.received += 1;
        info!(count = self.received, %message, "Message");
    }

    fn on_connected(&mut self) {
        info!("Connected");
    }

    fn on_reconnecting(&mut self, close: &CloseFrame) {
        warn!(%close, "Connection lost, reconnecting");
    }

    fn on_decode_error(&mut self, frame: &str, error: &serde_json::Error) {
        warn!(%frame, %error, "Skipping undecodable frame");
    }

    fn on_terminated(&mut self, error: &Error) {
        warn!(%error, "Session terminated");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base = std::env::var("ENDPOINT").unwrap_or_else(|_| "ws://127.0.0.1:8080".to_owned());
    let url = endpoint(&base, "socket", &[("client", "echo_client")])?;

    let session =
        Session::open::<Value, _>(url.as_str(), "echo", Config::default(), Logger::default())?;
    info!(id = %session.id(), %url, "Session opened");

    let mut state = session.state_receiver();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = ?current, "State changed");
                if current.is_connected() {
                    session.send(&json!({ "hello": session.name() }))?;
                }
            }
            line = lines.next_line() => {
                if let Some(line) = line? {
                    session.send(&json!({ "line": line }))?;
                } else {
                    info!("End of input, closing");
                    session.close().await;
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing");
                session.close().await;
                break;
            }
        }
    }

    info!(state = ?session.state(), "Done");
    Ok(())
}
