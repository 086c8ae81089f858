//! Protocol frame types shared by client and server.

use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};

/// Payload of a single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// First frame from a client: its display name
    Register {
        /// Name shown to peers (may be empty)
        name: String,
    },

    /// One line of chat text
    Text {
        /// The line, without a trailing newline
        body: String,
    },

    /// Client is leaving
    Disconnect,
}

impl Message {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Text { .. } => "text",
            Self::Disconnect => "disconnect",
        }
    }
}

/// One unit on the wire, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Sender's protocol version
    pub protocol_version: ProtocolVersion,

    /// Frame payload
    #[serde(flatten)]
    pub message: Message,
}

impl Frame {
    /// Creates a frame with the current protocol version.
    pub fn new(message: Message) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    /// Creates a registration frame.
    pub fn register(name: impl Into<String>) -> Self {
        Self::new(Message::Register { name: name.into() })
    }

    /// Creates a text frame.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(Message::Text { body: body.into() })
    }

    /// Creates a disconnect frame.
    pub fn disconnect() -> Self {
        Self::new(Message::Disconnect)
    }

    /// Returns the text body if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match &self.message {
            Message::Text { body } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_serialization() {
        let json = serde_json::to_string(&Frame::text("hello")).unwrap();
        assert!(json.contains("\"type\":\"text\""));
        assert!(json.contains("\"body\":\"hello\""));
        assert!(json.contains("\"protocol_version\":{\"major\":1,\"minor\":0}"));
    }

    #[test]
    fn test_disconnect_has_no_body() {
        let json = serde_json::to_string(&Frame::disconnect()).unwrap();
        assert!(json.contains("\"type\":\"disconnect\""));
        assert!(!json.contains("body"));
    }

    #[test]
    fn test_register_parses_from_wire_form() {
        let wire = r#"{"protocol_version":{"major":1,"minor":0},"type":"register","name":"Obi"}"#;
        let frame: Frame = serde_json::from_str(wire).unwrap();
        assert_eq!(frame.message, Message::Register { name: "Obi".into() });
        assert_eq!(frame.message.kind(), "register");
    }

    #[test]
    fn test_as_text() {
        assert_eq!(Frame::text("hi").as_text(), Some("hi"));
        assert_eq!(Frame::disconnect().as_text(), None);
    }
}
