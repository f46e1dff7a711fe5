//! # courier-relay: real-time message relay
//!
//! Clients hold a WebSocket open to the relay, announce who they are, and
//! address messages by recipient identity. Each identity has a personal
//! room; a message goes to every connection in the recipient's room and is
//! echoed back to the sender.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────┐
//! │ RelayClient │ ◄─────────────────► │ RelayServer  │
//! │ (per user)  │     JSON events     │ (one task    │
//! └─────────────┘                     │  per socket) │
//!                                     └──────┬───────┘
//!                                            │ Session
//!                                            ▼
//!                                   ┌────────────────────┐
//!                                   │ ConnectionRegistry │
//!                                   │ room → connections │
//!                                   └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: Tagged client/server events and their JSON encoding
//! - [`registry`]: Room membership with join / broadcast / remove
//! - [`session`]: Per-connection state machine
//! - [`server`]: WebSocket accept loop, heartbeat, cleanup
//! - [`client`]: WebSocket client
//!
//! Delivery is fire-and-forget. Nothing is stored, acknowledged or retried;
//! a message for a room without members is silently dropped.

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use client::{ClientState, RelayClient};
pub use error::RelayError;
pub use protocol::{
    ClientEvent, DeliveredMessage, OutgoingMessage, ProtocolError, ServerEvent, UserIdentity,
};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, RegistryStats};
pub use server::{RelayConfig, RelayServer, RelayStats};
pub use session::{Session, SessionState};
