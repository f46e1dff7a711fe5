//! Per-connection relay state machine.
//!
//! ```text
//!   transport open          setup(identity)
//!  ───────────────▶ Connected ───────────────▶ Ready
//!                      │                         │
//!                      └──── close / error ──────┴──▶ Closed
//! ```
//!
//! `join room` and `send message` are accepted in both `Connected` and
//! `Ready`; only `setup` moves the session forward. Repeated `setup`
//! calls accumulate rooms rather than replacing the previous identity.

use std::sync::Arc;

use crate::protocol::{ClientEvent, OutgoingMessage, ServerEvent, UserIdentity};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, no identity announced yet
    Connected,
    /// Joined at least one room through `setup`
    Ready,
    /// Terminal; registry membership has been released
    Closed,
}

/// Relay protocol handling for one connection.
pub struct Session {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    state: SessionState,
    identities: Vec<UserIdentity>,
}

impl Session {
    pub fn open(registry: Arc<ConnectionRegistry>, handle: ConnectionHandle) -> Self {
        log::info!("Connection {} established", handle.id());
        Self {
            handle,
            registry,
            state: SessionState::Connected,
            identities: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identities announced through `setup`, in announcement order.
    pub fn identities(&self) -> &[UserIdentity] {
        &self.identities
    }

    /// Dispatch one inbound event.
    pub async fn handle(&mut self, event: ClientEvent) {
        if self.state == SessionState::Closed {
            log::debug!(
                "Connection {} is closed, ignoring {}",
                self.id(),
                event.name()
            );
            return;
        }

        match event {
            ClientEvent::Setup(identity) => self.setup(identity).await,
            ClientEvent::JoinRoom(room) => self.join_room(room).await,
            ClientEvent::SendMessage(message) => self.send_message(message).await,
        }
    }

    async fn setup(&mut self, identity: UserIdentity) {
        log::info!("Connection {} set up as {identity}", self.id());
        self.registry.join(&self.handle, &identity).await;
        if !self.identities.contains(&identity) {
            self.identities.push(identity);
        }
        self.state = SessionState::Ready;
        self.deliver_to_self(ServerEvent::Connected);
    }

    async fn join_room(&mut self, room: UserIdentity) {
        log::info!("Connection {} joining room {room}", self.id());
        self.registry.join(&self.handle, &room).await;
    }

    async fn send_message(&self, message: OutgoingMessage) {
        let (recipient, delivered) = message.into_delivery();
        log::debug!("Connection {} forwarding to {recipient}", self.id());

        let event = ServerEvent::MessageReceived(delivered);
        let reached = self
            .registry
            .broadcast(&recipient, &event, Some(self.id()))
            .await;
        log::trace!("Message for {recipient} reached {reached} connection(s)");

        self.deliver_to_self(event);
    }

    fn deliver_to_self(&self, event: ServerEvent) {
        if !self.handle.send(event) {
            log::debug!("Connection {} writer gone, dropping reply", self.id());
        }
    }

    /// Release every room membership and enter `Closed`.
    ///
    /// Returns the number of rooms left. Only the first call does anything.
    pub async fn close(&mut self) -> usize {
        if self.state == SessionState::Closed {
            return 0;
        }
        self.state = SessionState::Closed;
        let left = self.registry.remove(self.id()).await;
        log::info!("Connection {} closed, left {left} room(s)", self.id());
        left
    }
}
