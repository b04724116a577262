//! WebSocket relay: verbatim broadcast fan-out.
//!
//! ```text
//! producer ──┐
//!            ├── RelayServer ── RelayHub (N-1 fan-out)
//! consumer ──┘        │
//!                     ├── consumer
//!                     └── consumer
//! ```
//!
//! Any text frame received from one participant is forwarded unchanged to
//! every other open participant. The relay never interprets application
//! frames beyond best-effort logging of role announcements; producers and
//! consumers enforce their own rules client-side.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::hub::RelayHub;
use crate::protocol::Frame;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Frames buffered per participant before a slow one starts dropping.
    pub fanout_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            fanout_capacity: 256,
        }
    }
}

/// Relay-wide statistics.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub total_bytes: u64,
}

/// The broadcast relay server.
pub struct RelayServer {
    config: RelayConfig,
    hub: Arc<RelayHub>,
    stats: Arc<RwLock<RelayStats>>,
}

impl RelayServer {
    /// Create a relay with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        let hub = Arc::new(RelayHub::new(config.fanout_capacity));
        Self {
            config,
            hub,
            stats: Arc::new(RwLock::new(RelayStats::default())),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    /// Accept connections and fan frames out until the process dies.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single participant connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<RelayHub>,
        stats: Arc<RwLock<RelayStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let id = Uuid::new_v4();
        let mut fanout = hub.join(id, addr.to_string()).await;
        log::info!("Participant {id} connected from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_frames += 1;
                                s.total_bytes += text.len() as u64;
                            }

                            // Forwarding is verbatim; parsing is only for logs.
                            if let Ok(Frame::Hello { role }) = Frame::decode(text.as_str()) {
                                log::debug!("Participant {id} announced role {role}");
                            }

                            hub.forward(id, Arc::from(text.as_str()));
                        }

                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        // The wire protocol is text-only; ignore the rest.
                        _ => {}
                    }
                }

                frame = fanout.recv() => {
                    match frame {
                        Ok((from, text)) => {
                            if from == id {
                                continue; // Skip own frames
                            }
                            if ws_sender.send(Message::text(text.as_ref())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            hub.note_dropped(n);
                            log::warn!("Participant {id} lagged by {n} frames");
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        hub.leave(&id).await;
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
        }
        log::info!("Participant {id} disconnected");

        Ok(())
    }

    /// Get relay statistics.
    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the fan-out hub.
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }
}
