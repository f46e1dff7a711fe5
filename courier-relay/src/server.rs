//! WebSocket relay server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                              ┌── room "alice" ── A
//!            ├── Session (per connection) ──┤
//! Client B ──┘          │                   └── room "bob"   ── B
//!                       ▼
//!              ConnectionRegistry (shared)
//! ```
//!
//! Every accepted socket runs in its own task. A task multiplexes four
//! sources: inbound frames (decoded and fed to its [`Session`]), the
//! outbound queue other sessions broadcast into, a heartbeat ticker that
//! pings the client, and an idle deadline pushed back by every inbound frame.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::error::RelayError;
use crate::protocol::{ClientEvent, ProtocolError, ServerEvent};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::session::Session;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Interval between server pings
    pub heartbeat_interval_secs: u64,
    /// Silence after which a client is considered dead
    pub idle_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            heartbeat_interval_secs: 25,
            idle_timeout_secs: 60,
        }
    }
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Never shorter than one second.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(1))
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub events_received: u64,
    pub malformed_frames: u64,
    pub events_delivered: u64,
    pub active_rooms: usize,
}

#[derive(Default)]
struct AtomicRelayStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    events_received: AtomicU64,
    malformed_frames: AtomicU64,
}

impl AtomicRelayStats {
    fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The relay server. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<AtomicRelayStats>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            stats: Arc::new(AtomicRelayStats::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Relay listening on {}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accept WebSocket connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("Failed to accept connection: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::warn!("Connection from {addr} ended: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection from upgrade to cleanup.
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), RelayError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("WebSocket connection established from {addr}");

        let (handle, outbound_rx) = ConnectionHandle::channel();
        let mut session = Session::open(self.registry.clone(), handle);
        self.stats.connection_opened();

        let result = self.drive(ws_stream, &mut session, outbound_rx, addr).await;

        // Runs for clean closes and transport failures alike
        session.close().await;
        self.stats.connection_closed();
        result
    }

    async fn drive(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        session: &mut Session,
        mut outbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
        addr: SocketAddr,
    ) -> Result<(), RelayError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let idle_timeout = self.config.idle_timeout();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                frame = ws_receiver.next() => {
                    last_seen = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(session, ClientEvent::decode(text.as_str()), addr).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.dispatch(session, ClientEvent::decode_bytes(&data), addr).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }

                Some(event) = outbound_rx.recv() => {
                    let text = event.encode()?;
                    ws_sender.send(Message::text(text)).await?;
                }

                _ = heartbeat.tick() => {
                    ws_sender.send(Message::Ping(Vec::new().into())).await?;
                }

                _ = tokio::time::sleep_until(last_seen + idle_timeout) => {
                    return Err(RelayError::IdleTimeout(idle_timeout));
                }
            }
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        decoded: Result<ClientEvent, ProtocolError>,
        addr: SocketAddr,
    ) {
        match decoded {
            Ok(event) => {
                self.stats.events_received.fetch_add(1, Ordering::Relaxed);
                log::debug!("Received {} from {addr}", event.name());
                session.handle(event).await;
            }
            Err(e) => {
                self.stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
                log::warn!("Ignoring frame from {addr}: {e}");
            }
        }
    }

    /// Get server statistics.
    pub async fn stats(&self) -> RelayStats {
        let registry = self.registry.stats().await;
        RelayStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            events_received: self.stats.events_received.load(Ordering::Relaxed),
            malformed_frames: self.stats.malformed_frames.load(Ordering::Relaxed),
            events_delivered: registry.events_delivered,
            active_rooms: registry.active_rooms,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.heartbeat_interval_secs, 25);
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_heartbeat_interval_never_zero() {
        let config = RelayConfig {
            heartbeat_interval_secs: 0,
            ..RelayConfig::default()
        };
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_idle_timeout_never_zero() {
        let config = RelayConfig {
            idle_timeout_secs: 0,
            ..RelayConfig::default()
        };
        assert_eq!(config.idle_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_server_custom_config() {
        let config = RelayConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_interval_secs: 10,
            idle_timeout_secs: 30,
        };
        let server = RelayServer::new(config);
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
        assert_eq!(server.config().idle_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = RelayServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.events_received, 0);
        assert_eq!(stats.malformed_frames, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let server = RelayServer::with_defaults();
        let clone = server.clone();
        assert!(Arc::ptr_eq(server.registry(), clone.registry()));
    }
}
