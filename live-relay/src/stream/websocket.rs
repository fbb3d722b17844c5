//! WebSocket event stream source.
//!
//! Connects to a relay endpoint that pushes one JSON-encoded [`StreamEvent`]
//! per text frame. The platform's own wire protocol stays behind that
//! endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{EventStreamSource, StreamConnection, StreamEvent};
use crate::domain::Handle;
use crate::utils::install_rustls_provider;
use crate::{Error, Result};

/// Placeholder substituted with the URL-encoded handle.
pub const HANDLE_PLACEHOLDER: &str = "{handle}";

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Event stream source over WebSocket.
pub struct WebSocketEventSource {
    url_template: String,
    channel_capacity: usize,
}

impl WebSocketEventSource {
    /// Create a source for a URL template such as `wss://relay.example/live/{handle}`.
    pub fn new(url_template: impl Into<String>, channel_capacity: usize) -> Self {
        install_rustls_provider();
        Self {
            url_template: url_template.into(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    fn url_for(&self, handle: &Handle) -> String {
        self.url_template
            .replace(HANDLE_PLACEHOLDER, &urlencoding::encode(handle.as_str()))
    }
}

#[async_trait]
impl EventStreamSource for WebSocketEventSource {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&self, handle: &Handle) -> Result<StreamConnection> {
        let url = self.url_for(handle);
        debug!(handle = %handle, "Connecting to WebSocket: {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection_failed(handle.as_str(), e.to_string()))?;

        info!(handle = %handle, "Connected to event stream");

        let (event_tx, event_rx) = mpsc::channel(self.channel_capacity);
        let shutdown = CancellationToken::new();
        tokio::spawn(read_loop(
            handle.clone(),
            ws_stream,
            event_tx,
            shutdown.clone(),
        ));

        Ok(StreamConnection::new(handle.clone(), event_rx, shutdown))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn read_loop(
    handle: Handle,
    mut stream: WsStream,
    events: mpsc::Sender<StreamEvent>,
    shutdown: CancellationToken,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let terminal = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = stream.close(None).await;
                debug!(handle = %handle, "Event stream closed");
                return;
            }

            _ = heartbeat.tick() => {
                if stream.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break StreamEvent::Disconnected { reason: Some("heartbeat failed".to_string()) };
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<StreamEvent>(text.as_str()) {
                            Ok(event) => {
                                let terminal = event.is_terminal();
                                if events.send(event).await.is_err() {
                                    return;
                                }
                                if terminal {
                                    let _ = stream.close(None).await;
                                    return;
                                }
                            }
                            Err(e) => warn!(handle = %handle, "Failed to decode frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break StreamEvent::Disconnected {
                            reason: frame.map(|f| f.reason.to_string()),
                        };
                    }
                    Some(Ok(_)) => trace!(handle = %handle, "Ignoring control frame"),
                    Some(Err(e)) => {
                        break StreamEvent::Disconnected { reason: Some(e.to_string()) };
                    }
                    None => break StreamEvent::Disconnected { reason: None },
                }
            }
        }
    };

    warn!(handle = %handle, "Event stream lost: {:?}", terminal);
    let _ = events.send(terminal).await;
}
