//! # courier-gateway: HTTP side of the messenger
//!
//! Registration with a profile picture upload, password login issuing a
//! JWT, lookups by username (`/getFriends`, `/getFullname`, `/getID`),
//! availability checks for usernames and emails, and the static `/assets`
//! directory the pictures are served from.
//!
//! Users live behind the [`IdentityStore`] trait; [`MemoryStore`] is the
//! bundled implementation.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use routes::{router, GatewayState, LoginResponse};
pub use store::{IdentityStore, MemoryStore, StoreError, UserProfile, UserRecord};

use tokio::net::TcpListener;

/// Serve `router` on an already bound listener.
pub async fn serve(listener: TcpListener, router: axum::Router) -> std::io::Result<()> {
    log::info!("Gateway listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await
}
