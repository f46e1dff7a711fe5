//! Relay error type.

use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::protocol::ProtocolError;

/// Errors raised by the relay server and client.
///
/// None of these are fatal to the process: the server logs them per
/// connection and keeps accepting.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("No frames received for {0:?}")]
    IdleTimeout(Duration),
}
