//! Live practice chat
//!
//! Room-scoped WebSocket chat for learners. `store` tracks active
//! connections and fans messages out to everyone in the same room; message
//! history is persisted separately through the `chat_messages` collection.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::{ChatRoomStore, WsSink};

/// Default room joined when the client does not name one
pub const DEFAULT_ROOM: &str = "general";

/// Events carried over the chat WebSocket, both directions.
///
/// Clients send `message`; the server fans out `message` and emits
/// `joined`/`left` membership notices.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Message {
        /// Server-set on fan-out; clients may omit it and send only `body`
        #[serde(default)]
        room: String,
        #[serde(rename = "senderId", default)]
        sender_id: String,
        #[serde(rename = "displayName", default)]
        display_name: String,
        body: String,
        #[serde(rename = "sentAt", default = "Utc::now")]
        sent_at: DateTime<Utc>,
    },
    Joined {
        room: String,
        #[serde(rename = "displayName")]
        display_name: String,
    },
    Left {
        room: String,
        #[serde(rename = "displayName")]
        display_name: String,
    },
}

/// Maximum accepted chat message body length in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Validate and normalize an inbound message body
pub fn sanitize_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_MESSAGE_CHARS {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_body("  namaskara  "), Some("namaskara".to_string()));
    }

    #[test]
    fn test_sanitize_rejects_empty() {
        assert_eq!(sanitize_body("   "), None);
        assert_eq!(sanitize_body(""), None);
    }

    #[test]
    fn test_sanitize_rejects_oversized() {
        let big = "ಕ".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(sanitize_body(&big), None);
        let ok = "ಕ".repeat(MAX_MESSAGE_CHARS);
        assert!(sanitize_body(&ok).is_some());
    }

    #[test]
    fn test_event_wire_shape() {
        let event = ChatEvent::Message {
            room: "general".into(),
            sender_id: "u1".into(),
            display_name: "Asha".into(),
            body: "hello".into(),
            sent_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["displayName"], "Asha");
    }
}
