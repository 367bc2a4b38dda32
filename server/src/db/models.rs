/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use campus_chat_protocol::Message;
use chrono::{DateTime, SecondsFormat, Utc};

/// User record in the users table
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub created_at: String,
}

/// Message record in the messages table.
/// `created_at` is RFC 3339 with millisecond precision so that text order
/// matches chronological order.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl MessageRow {
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            text: message.text.clone(),
            image_url: message.image_url.clone(),
            created_at: format_timestamp(&message.created_at),
        }
    }

    pub fn into_message(self) -> Result<Message, chrono::ParseError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)?.with_timezone(&Utc);
        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            text: self.text,
            image_url: self.image_url,
            created_at,
        })
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
