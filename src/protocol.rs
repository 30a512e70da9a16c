//! JSON frames sent from the browser (or terminal client) to the server.
//!
//! htmx's `ws-send` serializes the chat form, so a chat frame looks like
//! `{"message": "hi", "HEADERS": {...}}`. The stop button sends
//! `{"action": "stop"}`.

use serde::{Deserialize, Serialize};

/// Action carried by control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Stop,
}

/// An inbound frame, as understood by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Control { action: Action },
    Chat { message: String },
}

impl ClientMessage {
    pub fn chat(text: impl Into<String>) -> Self {
        ClientMessage::Chat {
            message: text.into(),
        }
    }

    pub fn stop() -> Self {
        ClientMessage::Control {
            action: Action::Stop,
        }
    }

    /// Parse a text frame. Returns `None` for anything that is not a
    /// recognised chat or control frame.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unrecognised client frame");
                None
            }
        }
    }

    pub fn to_json(&self) -> String {
        // Both variants are plain string maps; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_serializes_as_action() {
        assert_eq!(ClientMessage::stop().to_json(), r#"{"action":"stop"}"#);
    }

    #[test]
    fn test_chat_serializes_as_message() {
        assert_eq!(ClientMessage::chat("hi").to_json(), r#"{"message":"hi"}"#);
    }

    #[test]
    fn test_parse_htmx_form_frame_ignores_headers() {
        let frame = r#"{"message":"how far this week?","HEADERS":{"HX-Request":"true","HX-Trigger":"chat-form"}}"#;
        assert_eq!(
            ClientMessage::parse(frame),
            Some(ClientMessage::chat("how far this week?"))
        );
    }

    #[test]
    fn test_parse_stop() {
        assert_eq!(ClientMessage::parse(r#"{"action":"stop"}"#), Some(ClientMessage::stop()));
    }

    #[test]
    fn test_parse_unknown_action_rejected() {
        assert_eq!(ClientMessage::parse(r#"{"action":"pause"}"#), None);
    }

    #[test]
    fn test_parse_garbage_rejected() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"text":"hi"}"#), None);
    }
}
