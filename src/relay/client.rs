//! # Relay Client
//!
//! WebSocket connection to the relay, run as a background task.
//!
//! ## Session
//!
//! 1. Connect to the relay URL (`ws://127.0.0.1:3001/ws` by default)
//! 2. Send `client_register` as a controller
//! 3. Forward queued messages, send a `ping` every ping interval and
//!    record the latency reported by each `pong`
//! 4. On close or error, wait the reconnect interval and start over
//!
//! Messages queued while disconnected are discarded. The task exits once
//! every [`RelayHandle`] is dropped.

use async_trait::async_trait;
use futures::{Sink, SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use tracing::{debug, info, warn};

use super::message::{now_millis, RelayMessage};
use super::RelaySink;
use crate::config::RelayConfig;
use crate::diagnostics::{Diagnostics, EventKind};
use crate::error::{RelayPilotError, Result};

/// Messages buffered between the engine loop and the socket.
const QUEUE_CAPACITY: usize = 64;

/// Connection settings of the relay task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    pub url: String,
    pub ping_interval: Duration,
    pub reconnect_interval: Duration,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            url: config.url.clone(),
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            reconnect_interval: Duration::from_millis(config.reconnect_interval_ms),
        }
    }
}

/// Queueing end of the relay task.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayMessage>,
}

#[async_trait]
impl RelaySink for RelayHandle {
    async fn send(&mut self, message: RelayMessage) -> Result<()> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                debug!("Relay queue full, dropping {}", message.name);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(RelayPilotError::Relay("relay task stopped".to_string())),
        }
    }
}

/// How a connected session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Connection lost; reconnect.
    Disconnected,
    /// All handles dropped; stop.
    Shutdown,
}

/// Identifier announced in `client_register`.
fn client_id() -> String {
    format!("controller-{:x}{:04x}", std::process::id(), now_millis() & 0xffff)
}

/// Starts the relay task.
///
/// # Examples
///
/// ```no_run
/// use relay_pilot::diagnostics::Diagnostics;
/// use relay_pilot::relay::{client, RelayMessage, RelayOptions, RelaySink};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let options = RelayOptions {
///         url: "ws://127.0.0.1:3001/ws".to_string(),
///         ping_interval: Duration::from_millis(500),
///         reconnect_interval: Duration::from_secs(2),
///     };
///     let (mut relay, _task) = client::spawn(options, Diagnostics::default());
///     relay.send(RelayMessage::ping(0)).await?;
///     Ok(())
/// }
/// ```
pub fn spawn(options: RelayOptions, diagnostics: Diagnostics) -> (RelayHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(run(options, rx, diagnostics));
    (RelayHandle { tx }, task)
}

/// Connect/reconnect loop of the relay task.
pub async fn run(options: RelayOptions, mut rx: mpsc::Receiver<RelayMessage>, diagnostics: Diagnostics) {
    let id = client_id();
    info!("Relay client {} targeting {}", id, options.url);

    loop {
        match connect_async(options.url.as_str()).await {
            Ok((ws, _response)) => {
                info!("Connected to relay at {}", options.url);
                diagnostics.record(EventKind::RelayConnected);

                let (sink, stream) = ws.split();
                let end = session(&options, &id, sink, stream, &mut rx, &diagnostics).await;

                diagnostics.record(EventKind::RelayDisconnected);
                if end == SessionEnd::Shutdown {
                    info!("Relay client stopped");
                    return;
                }
                warn!("Disconnected from relay, retrying in {:?}", options.reconnect_interval);
            }
            Err(e) => {
                debug!("Relay connection to {} failed: {}", options.url, e);
            }
        }

        // Drop messages while waiting to reconnect
        let retry = tokio::time::sleep(options.reconnect_interval);
        tokio::pin!(retry);
        loop {
            tokio::select! {
                _ = &mut retry => break,
                message = rx.recv() => {
                    if message.is_none() {
                        info!("Relay client stopped");
                        return;
                    }
                }
            }
        }
    }
}

async fn send_message<S>(sink: &mut S, message: &RelayMessage, diagnostics: &Diagnostics) -> bool
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode {}: {}", message.name, e);
            return true;
        }
    };
    match sink.send(Message::Text(text)).await {
        Ok(()) => {
            diagnostics.record(EventKind::MessageSent {
                name: message.name.clone(),
            });
            true
        }
        Err(e) => {
            warn!("Failed to send {} to relay: {}", message.name, e);
            diagnostics.record(EventKind::Error {
                message: format!("relay send failed: {}", e),
            });
            false
        }
    }
}

fn handle_incoming(text: &str, diagnostics: &Diagnostics) {
    let message = match RelayMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable relay message: {}", e);
            diagnostics.record(EventKind::Error {
                message: format!("unparseable relay message: {}", e),
            });
            return;
        }
    };

    diagnostics.record(EventKind::MessageReceived {
        name: message.name.clone(),
    });
    if let Some(millis) = message.pong_latency(now_millis()) {
        debug!("Relay latency: {} ms", millis);
        diagnostics.record(EventKind::Latency { millis });
    }
}

async fn session<W, R>(
    options: &RelayOptions,
    id: &str,
    mut sink: W,
    mut stream: R,
    rx: &mut mpsc::Receiver<RelayMessage>,
    diagnostics: &Diagnostics,
) -> SessionEnd
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
    R: futures::Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    if !send_message(&mut sink, &RelayMessage::client_register(id), diagnostics).await {
        return SessionEnd::Disconnected;
    }

    let mut ping = interval_at(Instant::now() + options.ping_interval, options.ping_interval);

    loop {
        tokio::select! {
            queued = rx.recv() => {
                let Some(message) = queued else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                if !send_message(&mut sink, &message, diagnostics).await {
                    return SessionEnd::Disconnected;
                }
            }

            _ = ping.tick() => {
                if !send_message(&mut sink, &RelayMessage::ping(now_millis()), diagnostics).await {
                    return SessionEnd::Disconnected;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_incoming(&text, diagnostics),
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Relay connection error: {}", e);
                        diagnostics.record(EventKind::Error {
                            message: format!("relay connection error: {}", e),
                        });
                        return SessionEnd::Disconnected;
                    }
                }
            }
        }
    }
}
