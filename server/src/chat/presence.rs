//! Server-side presence tracking and broadcast.
//!
//! Presence is derived from the connection registry: a user is online iff
//! the registry holds a live handle for them. Every connect/disconnect
//! transition re-broadcasts the full online set to every connection.

use axum::{extract::State, Json};
use campus_chat_protocol::{LiveFrame, PresenceResponse, CLOSE_SUPERSEDED};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::state::AppState;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::protocol::encode_frame;
use crate::ws::{ConnectionHandle, ConnectionRegistry};

/// Owns every mutation of the connection registry.
///
/// `gate` serializes a transition together with the broadcast it triggers,
/// so clients observe presence snapshots in transition order.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
    gate: Arc<Mutex<()>>,
}

impl PresenceBroadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Register `handle` for `user_id` and announce the new online set.
    /// A previous connection for the same user is closed with 4000.
    pub fn connect(&self, user_id: &str, handle: ConnectionHandle) {
        let _gate = self.lock_gate();
        let new_id = handle.id();

        if let Some(previous) = self.registry.register(user_id, handle) {
            if previous.id() != new_id {
                tracing::info!(
                    user_id = %user_id,
                    superseded = %previous.id(),
                    "Closing superseded connection"
                );
                previous.close(CLOSE_SUPERSEDED, "Superseded by a newer connection");
            }
        }

        tracing::info!(user_id = %user_id, "User connected");
        self.broadcast_locked();
    }

    /// Release `connection_id` for `user_id` and announce the new online set.
    /// Returns false (and broadcasts nothing) if that connection was no
    /// longer registered.
    pub fn disconnect(&self, user_id: &str, connection_id: Uuid) -> bool {
        let _gate = self.lock_gate();

        if !self.registry.release(user_id, connection_id) {
            return false;
        }

        tracing::info!(user_id = %user_id, "User disconnected");
        self.broadcast_locked();
        true
    }

    /// Current online set, sorted.
    pub fn online_users(&self) -> Vec<String> {
        self.registry.snapshot()
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned gate carries no broken state
        self.gate.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Push the current snapshot to every registered handle. Handles whose
    /// push fails are released and the survivors get a corrected snapshot.
    /// Caller must hold the gate.
    fn broadcast_locked(&self) {
        loop {
            let handles = self.registry.handles();
            let online: Vec<String> = handles.iter().map(|(id, _)| id.clone()).collect();

            let Some(frame) = encode_frame(&LiveFrame::presence(online)) else {
                return;
            };

            let dead = broadcast_to_all(&handles, &frame);
            if dead.is_empty() {
                return;
            }

            let mut pruned = false;
            for (user_id, connection_id) in dead {
                tracing::warn!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    "Dead connection during presence broadcast, pruning"
                );
                pruned |= self.registry.release(&user_id, connection_id);
            }
            if !pruned {
                return;
            }
        }
    }
}

/// GET /api/presence
/// Current online set. JWT auth required.
pub async fn get_presence(State(state): State<AppState>, _claims: Claims) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        success: true,
        connected_users: state.connections.snapshot(),
    })
}
