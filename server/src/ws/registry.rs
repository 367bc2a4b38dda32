//! Connection registry: maps a user id to its single live connection.
//!
//! Only the presence broadcaster mutates the registry in production code;
//! the router and the REST layer read it.

use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ChatError;

/// Sender half of a WebSocket connection's outbound queue.
/// The connection's writer task owns the receiving half.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Live transport handle for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame for this connection. Never blocks.
    /// Fails once the writer task has gone away.
    pub fn push(&self, msg: Message) -> Result<(), ChatError> {
        self.sender
            .send(msg)
            .map_err(|_| ChatError::DeadConnection(self.id))
    }

    /// Ask the writer to send a Close frame. Best-effort.
    pub fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = self.sender.send(Message::Close(Some(frame)));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// User id → live handle. At most one handle per user; registering again
/// supersedes the previous handle.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the handle for `user_id`. Returns the superseded handle.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self.inner.insert(user_id.to_string(), handle);
        tracing::debug!(
            user_id = %user_id,
            replaced = previous.is_some(),
            connections = self.inner.len(),
            "Connection registered"
        );
        previous
    }

    /// Remove whatever handle is stored for `user_id`. No-op if absent.
    pub fn unregister(&self, user_id: &str) -> Option<ConnectionHandle> {
        let removed = self.inner.remove(user_id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::debug!(user_id = %user_id, "Connection unregistered");
        }
        removed
    }

    /// Remove the entry for `user_id` only if it still belongs to
    /// `connection_id`. A superseded connection closing late must not evict
    /// its replacement.
    pub fn release(&self, user_id: &str, connection_id: Uuid) -> bool {
        let removed = self
            .inner
            .remove_if(user_id, |_, handle| handle.id() == connection_id)
            .is_some();
        if removed {
            tracing::debug!(
                user_id = %user_id,
                connection_id = %connection_id,
                "Connection released"
            );
        }
        removed
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.inner.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    /// All registered user ids, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Copy of every `(user_id, handle)` pair, sorted by user id.
    /// Callers iterate the copy, so concurrent mutation cannot invalidate it.
    pub fn handles(&self) -> Vec<(String, ConnectionHandle)> {
        let mut handles: Vec<(String, ConnectionHandle)> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
