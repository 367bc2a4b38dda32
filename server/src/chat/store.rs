//! Durable message store trait and SQLite implementation.

use async_trait::async_trait;
use campus_chat_protocol::Message;

use crate::db::models::MessageRow;
use crate::db::DbPool;
use crate::error::ChatError;

/// Single writer-of-record for message history.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a fully-formed message.
    async fn insert(&self, message: &Message) -> Result<(), ChatError>;

    /// Every message exchanged between `user_a` and `user_b` in either
    /// direction, oldest first.
    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, ChatError>;
}

#[derive(Clone)]
pub struct SqliteMessageStore {
    db: DbPool,
}

impl SqliteMessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert(&self, message: &Message) -> Result<(), ChatError> {
        let db = self.db.clone();
        let row = MessageRow::from_message(message);

        tokio::task::spawn_blocking(move || -> Result<(), ChatError> {
            let conn = db
                .lock()
                .map_err(|e| ChatError::Internal(format!("DB lock error: {}", e)))?;
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.receiver_id,
                    row.text,
                    row.image_url,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
        .await?
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, ChatError> {
        let db = self.db.clone();
        let a = user_a.to_string();
        let b = user_b.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<Message>, ChatError> {
            let conn = db
                .lock()
                .map_err(|e| ChatError::Internal(format!("DB lock error: {}", e)))?;

            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, text, image_url, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![a, b], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        text: row.get(3)?,
                        image_url: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<MessageRow>, _>>()?;

            rows.into_iter()
                .map(|row| {
                    row.into_message().map_err(|e| {
                        ChatError::Internal(format!("Corrupt message timestamp: {}", e))
                    })
                })
                .collect()
        })
        .await?
    }
}
