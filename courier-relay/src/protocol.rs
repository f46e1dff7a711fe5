//! JSON event protocol spoken over the relay WebSocket.
//!
//! Wire format (one JSON document per text frame, adjacently tagged):
//! ```text
//! client → server   {"event": "setup",        "data": "alice"}
//!                   {"event": "join room",    "data": "alice"}
//!                   {"event": "send message", "data": {"recipient": "bob",
//!                                                      "message": {...},
//!                                                      "sender": ...,
//!                                                      "flag": ...}}
//! server → client   {"event": "connected"}
//!                   {"event": "message received", "data": {"message": {...},
//!                                                          "sender": ...,
//!                                                          "flag": ...}}
//! ```
//!
//! `message`, `sender` and `flag` are opaque to the relay and forwarded as-is.

use std::borrow::Borrow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a user. Also the name of that user's personal room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserIdentity {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<String> for UserIdentity {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

impl AsRef<str> for UserIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UserIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A chat message as submitted by the sending client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Room the message is addressed to
    pub recipient: UserIdentity,
    /// Message body
    #[serde(default)]
    pub message: Value,
    /// Describes the sender for the receiving UI
    #[serde(default)]
    pub sender: Value,
    #[serde(default)]
    pub flag: Value,
}

impl OutgoingMessage {
    pub fn new(
        recipient: impl Into<UserIdentity>,
        message: Value,
        sender: impl Into<Value>,
        flag: impl Into<Value>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            message,
            sender: sender.into(),
            flag: flag.into(),
        }
    }

    /// Split into the recipient room and the payload delivered to it.
    pub fn into_delivery(self) -> (UserIdentity, DeliveredMessage) {
        let delivered = DeliveredMessage {
            message: self.message,
            sender: self.sender,
            flag: self.flag,
        };
        (self.recipient, delivered)
    }
}

/// A chat message as delivered to room members and echoed to its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    #[serde(default)]
    pub message: Value,
    #[serde(default)]
    pub sender: Value,
    #[serde(default)]
    pub flag: Value,
}

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Announce identity: join own room and receive `connected`
    #[serde(rename = "setup")]
    Setup(UserIdentity),
    /// Join a room without acknowledgement
    #[serde(rename = "join room")]
    JoinRoom(UserIdentity),
    /// Relay a message to the recipient's room
    #[serde(rename = "send message")]
    SendMessage(OutgoingMessage),
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::JoinRoom(_) => "join room",
            Self::SendMessage(_) => "send message",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode(text)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        decode(text)
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges `setup`
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "message received")]
    MessageReceived(DeliveredMessage),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::MessageReceived(_) => "message received",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode(text)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        decode(text)
    }
}

fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Frame is not valid UTF-8")]
    NotUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_wire_shape() {
        let event = ClientEvent::Setup(UserIdentity::new("alice"));
        let text = event.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"event": "setup", "data": "alice"}));
    }

    #[test]
    fn test_connected_has_no_data() {
        let text = ServerEvent::Connected.encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"event": "connected"}));
        assert_eq!(ServerEvent::decode(&text).unwrap(), ServerEvent::Connected);
    }

    #[test]
    fn test_decode_send_message() {
        let text = r#"{"event":"send message","data":{"recipient":"bob","message":{"text":"hi"},"sender":"alice","flag":false}}"#;
        match ClientEvent::decode(text).unwrap() {
            ClientEvent::SendMessage(msg) => {
                assert_eq!(msg.recipient.as_str(), "bob");
                assert_eq!(msg.message, json!({"text": "hi"}));
                assert_eq!(msg.sender, json!("alice"));
                assert_eq!(msg.flag, json!(false));
            }
            other => panic!("Expected SendMessage, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_flag_defaults_to_null() {
        let text = r#"{"event":"send message","data":{"recipient":"bob","message":"yo","sender":{"name":"Alice"}}}"#;
        let ClientEvent::SendMessage(msg) = ClientEvent::decode(text).unwrap() else {
            panic!("Expected SendMessage");
        };
        assert_eq!(msg.flag, Value::Null);
        assert_eq!(msg.sender, json!({"name": "Alice"}));
    }

    #[test]
    fn test_missing_payload_fields_forwarded_as_null() {
        let text = r#"{"event":"send message","data":{"recipient":"bob"}}"#;
        let ClientEvent::SendMessage(msg) = ClientEvent::decode(text).unwrap() else {
            panic!("Expected SendMessage");
        };
        let (room, delivered) = msg.into_delivery();
        assert_eq!(room, UserIdentity::new("bob"));
        assert_eq!(delivered.message, Value::Null);
        assert_eq!(delivered.sender, Value::Null);
        assert_eq!(delivered.flag, Value::Null);

        let received = ServerEvent::decode(r#"{"event":"message received","data":{}}"#).unwrap();
        assert_eq!(received, ServerEvent::MessageReceived(delivered));
    }

    #[test]
    fn test_send_message_requires_recipient() {
        let text = r#"{"event":"send message","data":{"message":"hi","sender":"alice"}}"#;
        assert!(matches!(
            ClientEvent::decode(text),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_delivery_drops_recipient() {
        let msg = OutgoingMessage::new("bob", json!({"text": "hi"}), "alice", true);
        let (room, delivered) = msg.into_delivery();
        assert_eq!(room, UserIdentity::new("bob"));

        let text = ServerEvent::MessageReceived(delivered).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "message received",
                "data": {"message": {"text": "hi"}, "sender": "alice", "flag": true}
            })
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ClientEvent::decode(r#"{"event":"typing","data":"bob"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert_eq!(ClientEvent::decode_bytes(&garbage).unwrap_err(), ProtocolError::NotUtf8);
    }

    #[test]
    fn test_binary_frame_json() {
        let bytes = br#"{"event":"join room","data":"carol"}"#;
        assert_eq!(
            ClientEvent::decode_bytes(bytes).unwrap(),
            ClientEvent::JoinRoom(UserIdentity::new("carol"))
        );
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ClientEvent::Setup("a".into()).name(), "setup");
        assert_eq!(ClientEvent::JoinRoom("a".into()).name(), "join room");
        assert_eq!(ServerEvent::Connected.name(), "connected");
    }
}
