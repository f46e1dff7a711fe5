//! Room membership table with join / broadcast / remove.
//!
//! Each live connection is represented by a [`ConnectionHandle`]: its id plus
//! the sending half of an unbounded channel drained by the connection's
//! writer. Rooms map to the handles of their members, and a reverse index
//! records which rooms each connection joined so that disconnect cleanup
//! does not have to scan every room.
//!
//! ```text
//!            join / remove (write lock)
//!                    │
//!   ┌────────────────▼─────────────────┐
//!   │ rooms:       "alice" → {c1, c3}  │
//!   │              "bob"   → {c2}      │
//!   │ memberships: c1 → {"alice"}      │
//!   │              c2 → {"bob"}        │
//!   │              c3 → {"alice"}      │
//!   └────────────────┬─────────────────┘
//!                    │ broadcast: snapshot under read lock,
//!                    ▼ send after the lock is released
//!            c1.outbound   c3.outbound
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::protocol::{ServerEvent, UserIdentity};

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Addressable end of a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            id: ConnectionId::new(),
            outbound,
        }
    }

    /// Create a handle together with the receiver its writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue an event for this connection. Never blocks.
    ///
    /// Returns `false` when the connection's writer is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Point-in-time registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub events_delivered: u64,
    /// Sends to connections whose writer had already gone away
    pub events_dropped: u64,
    pub active_rooms: usize,
    pub active_connections: usize,
}

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<UserIdentity, HashMap<ConnectionId, ConnectionHandle>>,
    memberships: HashMap<ConnectionId, HashSet<UserIdentity>>,
}

/// Shared room membership table.
///
/// Mutation (`join`, `remove`) is serialized behind one write lock.
/// `broadcast` copies the member handles out under a read lock and sends
/// after releasing it, so a slow reader never holds up joins.
#[derive(Default)]
pub struct ConnectionRegistry {
    table: RwLock<RoomTable>,
    events_delivered: AtomicU64,
    events_dropped: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first join.
    ///
    /// Returns `true` if membership changed; joining twice is a no-op.
    pub async fn join(&self, handle: &ConnectionHandle, room: &UserIdentity) -> bool {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let members = table.rooms.entry(room.clone()).or_default();
        if members.contains_key(&handle.id) {
            return false;
        }
        members.insert(handle.id, handle.clone());
        table
            .memberships
            .entry(handle.id)
            .or_default()
            .insert(room.clone());
        true
    }

    /// Deliver `event` to every member of `room`, skipping `exclude`.
    ///
    /// An empty or unknown room is not an error; nothing is sent and 0 is
    /// returned. Returns the number of connections the event was queued for.
    pub async fn broadcast(
        &self,
        room: &UserIdentity,
        event: &ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<ConnectionHandle> = {
            let table = self.table.read().await;
            match table.rooms.get(room) {
                Some(members) => members
                    .values()
                    .filter(|handle| Some(handle.id) != exclude)
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };

        if targets.is_empty() {
            log::trace!("Room {room} has no other members");
            return 0;
        }

        let mut delivered = 0;
        for target in &targets {
            if target.send(event.clone()) {
                delivered += 1;
            } else {
                self.events_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.events_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Remove a connection from every room it joined.
    ///
    /// Rooms left without members are dropped. Returns how many rooms the
    /// connection was removed from.
    pub async fn remove(&self, id: ConnectionId) -> usize {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let Some(rooms) = table.memberships.remove(&id) else {
            return 0;
        };
        for room in &rooms {
            if let Some(members) = table.rooms.get_mut(room) {
                members.remove(&id);
                if members.is_empty() {
                    table.rooms.remove(room);
                    log::debug!("Room {room} removed (empty)");
                }
            }
        }
        rooms.len()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.table.read().await.rooms.len()
    }

    pub async fn member_count(&self, room: &UserIdentity) -> usize {
        self.table
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashMap::len)
    }

    pub async fn is_member(&self, id: ConnectionId, room: &UserIdentity) -> bool {
        self.table
            .read()
            .await
            .rooms
            .get(room)
            .is_some_and(|members| members.contains_key(&id))
    }

    /// Rooms the connection currently belongs to, sorted.
    pub async fn rooms_of(&self, id: ConnectionId) -> Vec<UserIdentity> {
        let table = self.table.read().await;
        let mut rooms: Vec<UserIdentity> = table
            .memberships
            .get(&id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    pub async fn stats(&self) -> RegistryStats {
        let table = self.table.read().await;
        RegistryStats {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            active_rooms: table.rooms.len(),
            active_connections: table.memberships.len(),
        }
    }
}
