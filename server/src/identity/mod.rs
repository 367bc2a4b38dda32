//! Identity provider seam.
//!
//! Authentication happens upstream (see `auth`); the messaging core only
//! needs to know whether a user id resolves to a known identity.

use async_trait::async_trait;
use chrono::Utc;

use crate::db::models::{format_timestamp, UserRow};
use crate::db::DbPool;
use crate::error::ChatError;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up a user by id. `None` means the id is unknown.
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRow>, ChatError>;
}

/// Identity provider backed by the `users` table.
#[derive(Clone)]
pub struct SqliteIdentityProvider {
    db: DbPool,
}

impl SqliteIdentityProvider {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRow>, ChatError> {
        let db = self.db.clone();
        let uid = user_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<UserRow>, ChatError> {
            let conn = db
                .lock()
                .map_err(|e| ChatError::Internal(format!("DB lock error: {}", e)))?;
            let row = conn.query_row(
                "SELECT id, display_name, created_at FROM users WHERE id = ?1",
                rusqlite::params![uid],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            );
            match row {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

/// Insert or refresh an identity in the users table.
/// Profile management lives outside the messaging core; this is the hook it
/// (and the test suite) uses to make ids resolvable.
pub fn register_user(
    db: &DbPool,
    user_id: &str,
    display_name: &str,
) -> Result<UserRow, Box<dyn std::error::Error + Send + Sync>> {
    let conn = db.lock().map_err(|e| format!("DB lock error: {}", e))?;
    let now = format_timestamp(&Utc::now());

    conn.execute(
        "INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
        rusqlite::params![user_id, display_name, now],
    )?;

    tracing::debug!(user_id = %user_id, "Identity registered");

    Ok(UserRow {
        id: user_id.to_string(),
        display_name: display_name.to_string(),
        created_at: now,
    })
}
