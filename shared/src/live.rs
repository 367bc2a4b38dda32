use serde::{Deserialize, Serialize};

use crate::Message;

/// Server-to-client push events on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    /// Full snapshot of the users currently holding a live connection.
    #[serde(rename = "connection", rename_all = "camelCase")]
    Presence { connected_users: Vec<String> },
    /// A chat message addressed to the receiving user.
    #[serde(rename = "message")]
    Chat { message: Message },
}

/// Envelope for every frame pushed over the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveFrame {
    pub success: bool,
    #[serde(flatten)]
    pub event: LiveEvent,
}

impl LiveFrame {
    pub fn presence(connected_users: Vec<String>) -> Self {
        Self {
            success: true,
            event: LiveEvent::Presence { connected_users },
        }
    }

    pub fn chat(message: Message) -> Self {
        Self {
            success: true,
            event: LiveEvent::Chat { message },
        }
    }
}
