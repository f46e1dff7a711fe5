//! WebSocket client for the relay.
//!
//! Provides:
//! - Connection lifecycle (connect, close)
//! - `setup` / `join room` / `send message` helpers
//! - A channel of decoded [`ServerEvent`]s for the application
//!
//! Delivery is best-effort: there is no reconnection and nothing is queued
//! while disconnected.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::error::RelayError;
use crate::protocol::{ClientEvent, OutgoingMessage, ServerEvent, UserIdentity};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
}

/// The relay client.
pub struct RelayClient {
    /// Connection state
    state: Arc<RwLock<ClientState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<Message>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<ServerEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<ServerEvent>,

    server_url: String,
}

impl RelayClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            state: Arc::new(RwLock::new(ClientState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }

    /// Connect to the relay.
    ///
    /// Spawns background tasks for reading and writing WebSocket frames.
    pub async fn connect(&mut self) -> Result<(), RelayError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.server_url.as_str()).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(256);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if ws_writer.send(frame).await.is_err() || closing {
                    break;
                }
            }
        });
        self.outgoing_tx = Some(out_tx);
        *self.state.write().await = ClientState::Connected;

        // Reader task: decode server events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                let decoded = match frame {
                    Ok(Message::Text(text)) => ServerEvent::decode(text.as_str()),
                    Ok(Message::Binary(data)) => ServerEvent::decode_bytes(&data),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                match decoded {
                    Ok(event) => {
                        if event_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Ignoring frame from relay: {e}"),
                }
            }
            *state.write().await = ClientState::Disconnected;
            log::debug!("Relay connection closed");
        });

        Ok(())
    }

    /// Announce our identity; the relay answers with `connected`.
    pub async fn setup(&self, identity: impl Into<UserIdentity>) -> Result<(), RelayError> {
        self.send_event(&ClientEvent::Setup(identity.into())).await
    }

    pub async fn join_room(&self, room: impl Into<UserIdentity>) -> Result<(), RelayError> {
        self.send_event(&ClientEvent::JoinRoom(room.into())).await
    }

    pub async fn send_message(
        &self,
        recipient: impl Into<UserIdentity>,
        message: Value,
        sender: impl Into<Value>,
        flag: impl Into<Value>,
    ) -> Result<(), RelayError> {
        let outgoing = OutgoingMessage::new(recipient, message, sender, flag);
        self.send_event(&ClientEvent::SendMessage(outgoing)).await
    }

    /// Send an arbitrary client event.
    pub async fn send_event(&self, event: &ClientEvent) -> Result<(), RelayError> {
        let text = event.encode()?;
        self.send_frame(Message::text(text)).await
    }

    /// Send a raw frame, bypassing event encoding.
    pub async fn send_frame(&self, frame: Message) -> Result<(), RelayError> {
        if *self.state.read().await != ClientState::Connected {
            return Err(RelayError::ConnectionClosed);
        }
        let tx = self.outgoing_tx.as_ref().ok_or(RelayError::ConnectionClosed)?;
        tx.send(frame).await.map_err(|_| RelayError::ConnectionClosed)
    }

    /// Close the connection with a WebSocket close frame.
    pub async fn close(&mut self) -> Result<(), RelayError> {
        let result = self.send_frame(Message::Close(None)).await;
        self.outgoing_tx = None;
        *self.state.write().await = ClientState::Disconnected;
        result
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
