//! Live delivery of persisted messages.
//!
//! Fire-and-forget, at most once: the durable store is the catch-up path for
//! anything that does not reach a live connection.

use campus_chat_protocol::{LiveFrame, Message};

use crate::chat::presence::PresenceBroadcaster;
use crate::error::ChatError;
use crate::ws::broadcast::send_to_user;
use crate::ws::protocol::encode_frame;
use crate::ws::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed to the receiver's live connection.
    Delivered,
    /// Receiver has no live connection; nothing was pushed.
    Offline,
    /// Receiver's handle had already died; it was pruned.
    DeadConnection,
    /// The frame could not be encoded; nothing was pushed.
    Dropped,
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: ConnectionRegistry,
    presence: PresenceBroadcaster,
}

impl MessageRouter {
    pub fn new(registry: ConnectionRegistry, presence: PresenceBroadcaster) -> Self {
        Self { registry, presence }
    }

    /// Push `message` to its receiver if they are online.
    /// Never retries and never queues.
    pub fn deliver(&self, message: &Message) -> DeliveryOutcome {
        let receiver = message.receiver_id.as_str();

        let Some(frame) = encode_frame(&LiveFrame::chat(message.clone())) else {
            return DeliveryOutcome::Dropped;
        };

        match send_to_user(&self.registry, receiver, frame) {
            Ok(true) => {
                tracing::debug!(
                    message_id = %message.id,
                    receiver_id = %receiver,
                    "Message delivered over live channel"
                );
                DeliveryOutcome::Delivered
            }
            Ok(false) => {
                tracing::debug!(
                    message_id = %message.id,
                    receiver_id = %receiver,
                    "Receiver offline, message left for history fetch"
                );
                DeliveryOutcome::Offline
            }
            Err(ChatError::DeadConnection(connection_id)) => {
                tracing::warn!(
                    receiver_id = %receiver,
                    connection_id = %connection_id,
                    "Dead connection during delivery, pruning"
                );
                self.presence.disconnect(receiver, connection_id);
                DeliveryOutcome::DeadConnection
            }
            Err(e) => {
                tracing::error!(receiver_id = %receiver, error = %e, "Delivery failed");
                DeliveryOutcome::Dropped
            }
        }
    }
}
