use axum::extract::ws::Message;
use uuid::Uuid;

use super::{ConnectionHandle, ConnectionRegistry};
use crate::error::ChatError;

/// Push one frame to every handle in `handles`.
/// Each push is independent; returns `(user_id, connection_id)` for every
/// handle whose push failed.
pub fn broadcast_to_all(handles: &[(String, ConnectionHandle)], msg: &Message) -> Vec<(String, Uuid)> {
    let mut dead = Vec::new();
    for (user_id, handle) in handles {
        if handle.push(msg.clone()).is_err() {
            dead.push((user_id.clone(), handle.id()));
        }
    }
    dead
}

/// Push a frame to a specific user's live connection.
/// `Ok(false)` means the user is offline; `Err(DeadConnection)` means the
/// stored handle no longer accepts frames.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, msg: Message) -> Result<bool, ChatError> {
    match registry.lookup(user_id) {
        Some(handle) => handle.push(msg).map(|_| true),
        None => Ok(false),
    }
}
