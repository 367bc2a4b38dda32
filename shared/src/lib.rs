//! Wire types shared by the campus chat server and client.
//!
//! The live channel carries JSON text frames shaped as
//! `{ "success": true, "type": "connection" | "message", ... }`.
//! REST bodies use camelCase field names throughout.

pub mod api;
pub mod live;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use api::{
    ErrorResponse, HistoryResponse, PresenceResponse, SendMessageRequest, SendMessageResponse,
};
pub use live::{LiveEvent, LiveFrame};

/// WebSocket close codes sent by the server.
/// 4000 = replaced by a newer connection for the same user
/// 4001 = token expired
/// 4002 = token invalid
pub const CLOSE_SUPERSEDED: u16 = 4000;
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// A persisted direct message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// True when `{sender, receiver}` equals the unordered pair `{a, b}`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message {
            id: "m1".to_string(),
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            text: Some("hi".to_string()),
            image_url: None,
            created_at: "2024-03-01T10:00:00.000Z".parse().unwrap(),
        }
    }

    #[test]
    fn is_between_ignores_direction() {
        let msg = sample();
        assert!(msg.is_between("alice", "bob"));
        assert!(msg.is_between("bob", "alice"));
        assert!(!msg.is_between("alice", "carol"));
    }

    #[test]
    fn serializes_camel_case_and_omits_missing_image() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["receiverId"], "bob");
        assert!(json.get("imageUrl").is_none());
    }
}
