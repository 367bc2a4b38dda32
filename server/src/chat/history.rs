//! Message history service: validates, persists and queries conversations.
//!
//! Persistence success is the durability boundary. This service never pushes
//! anything live; the caller hands the returned message to the router.

use chrono::{SubsecRound, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use campus_chat_protocol::Message;

use crate::chat::store::MessageStore;
use crate::error::ChatError;
use crate::identity::IdentityProvider;

/// Default cap on a single store or identity call.
pub const DEFAULT_HISTORY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn MessageStore>,
    identity: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

/// Trim text; blank text counts as absent.
pub fn normalize_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Reject a message with neither text nor image, or with no receiver.
pub fn validate_draft(
    receiver_id: &str,
    text: Option<&str>,
    has_image: bool,
) -> Result<(), ChatError> {
    if text.is_none() && !has_image {
        return Err(ChatError::Validation(
            "Field text or image is required to send message!".to_string(),
        ));
    }
    if receiver_id.trim().is_empty() {
        return Err(ChatError::Validation(
            "Receiver ID is required to send message!".to_string(),
        ));
    }
    Ok(())
}

impl HistoryService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            timeout,
        }
    }

    /// Validate, stamp and persist a message. Returns the stored record.
    pub async fn append(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: Option<String>,
        image_url: Option<String>,
    ) -> Result<Message, ChatError> {
        let text = normalize_text(text);
        let image_url = image_url.filter(|url| !url.trim().is_empty());
        validate_draft(receiver_id, text.as_deref(), image_url.is_some())?;
        self.check_participants(sender_id, receiver_id).await?;

        let message = Message {
            id: uuid::Uuid::now_v7().to_string(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text,
            image_url,
            // Stored with millisecond precision; keep the returned copy identical
            created_at: Utc::now().trunc_subsecs(3),
        };

        self.bounded("append", self.store.insert(&message)).await?;

        tracing::debug!(
            message_id = %message.id,
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            "Message persisted"
        );

        Ok(message)
    }

    /// Full conversation between `user_a` and `user_b`, oldest first.
    /// Symmetric in its arguments.
    pub async fn query(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, ChatError> {
        if user_b.trim().is_empty() {
            return Err(ChatError::Validation("User ID is required!".to_string()));
        }
        self.ensure_known(user_b).await?;
        self.bounded("query", self.store.conversation(user_a, user_b))
            .await
    }

    /// Fail with `NotFound` unless both ids resolve.
    pub async fn check_participants(&self, sender_id: &str, receiver_id: &str) -> Result<(), ChatError> {
        self.ensure_known(receiver_id).await?;
        self.ensure_known(sender_id).await
    }

    async fn ensure_known(&self, user_id: &str) -> Result<(), ChatError> {
        match self.bounded("identity", self.identity.find_user(user_id)).await? {
            Some(_) => Ok(()),
            None => Err(ChatError::NotFound(format!("User {} not found", user_id))),
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, ChatError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(op = op, timeout_ms = self.timeout.as_millis() as u64, "History store timed out");
                Err(ChatError::TransientStore(format!(
                    "Message store did not answer within {} ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::chat::store::SqliteMessageStore;
    use crate::db::DbPool;
    use crate::identity::{register_user, SqliteIdentityProvider};

    fn setup() -> (HistoryService, DbPool, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = crate::db::init_db(tmp.path().to_str().unwrap()).unwrap();
        for user in ["alice", "bob", "carol"] {
            register_user(&db, user, user).unwrap();
        }
        let service = HistoryService::new(
            Arc::new(SqliteMessageStore::new(db.clone())),
            Arc::new(SqliteIdentityProvider::new(db.clone())),
            DEFAULT_HISTORY_TIMEOUT,
        );
        (service, db, tmp)
    }

    fn message_count(db: &DbPool) -> i64 {
        let conn = db.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn append_then_query_is_symmetric() {
        let (service, _db, _tmp) = setup();

        let first = service
            .append("alice", "bob", Some("hi".into()), None)
            .await
            .unwrap();
        let reply = service
            .append("bob", "alice", Some("hey".into()), None)
            .await
            .unwrap();

        let from_alice = service.query("alice", "bob").await.unwrap();
        let from_bob = service.query("bob", "alice").await.unwrap();

        assert_eq!(from_alice, vec![first, reply.clone()]);
        assert_eq!(from_alice, from_bob);
        assert_eq!(from_alice.last(), Some(&reply));
    }

    #[tokio::test]
    async fn query_is_ordered_and_excludes_other_pairs() {
        let (service, _db, _tmp) = setup();

        let m1 = service.append("alice", "bob", Some("1".into()), None).await.unwrap();
        service.append("alice", "carol", Some("x".into()), None).await.unwrap();
        let m2 = service.append("bob", "alice", Some("2".into()), None).await.unwrap();
        service.append("carol", "bob", Some("y".into()), None).await.unwrap();
        let m3 = service.append("alice", "bob", Some("3".into()), None).await.unwrap();

        let history = service.query("bob", "alice").await.unwrap();
        assert_eq!(history, vec![m1, m2, m3]);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_persisting() {
        let (service, db, _tmp) = setup();

        let err = service
            .append("alice", "bob", Some("   ".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        let err = service.append("alice", "bob", None, None).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        assert_eq!(message_count(&db), 0);
    }

    #[tokio::test]
    async fn missing_receiver_is_a_validation_error() {
        let (service, _db, _tmp) = setup();
        let err = service
            .append("alice", "", Some("hi".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_peer_is_not_found() {
        let (service, db, _tmp) = setup();

        let err = service
            .append("alice", "mallory", Some("hi".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert_eq!(message_count(&db), 0);

        let err = service.query("alice", "mallory").await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn image_only_message_is_accepted() {
        let (service, _db, _tmp) = setup();
        let msg = service
            .append("alice", "bob", None, Some("/media/cat.webp".into()))
            .await
            .unwrap();
        assert_eq!(msg.text, None);
        assert_eq!(msg.image_url.as_deref(), Some("/media/cat.webp"));
    }

    struct StalledStore;

    #[async_trait]
    impl MessageStore for StalledStore {
        async fn insert(&self, _message: &Message) -> Result<(), ChatError> {
            std::future::pending().await
        }

        async fn conversation(&self, _a: &str, _b: &str) -> Result<Vec<Message>, ChatError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out_as_transient() {
        let (_service, db, _tmp) = setup();
        let service = HistoryService::new(
            Arc::new(StalledStore),
            Arc::new(SqliteIdentityProvider::new(db)),
            Duration::from_millis(50),
        );

        let err = service.query("alice", "bob").await.unwrap_err();
        assert!(matches!(err, ChatError::TransientStore(_)));

        let err = service
            .append("alice", "bob", Some("hi".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::TransientStore(_)));
    }
}
