//! Per-user chat session state.
//!
//! `ChatSession` is a plain state machine with no I/O: the controller feeds
//! it history fetch results, live events and send outcomes. A session moves
//! `Idle -> LoadingHistory -> Ready` when a peer is selected and falls back
//! to `Idle` if the history fetch fails.

use campus_chat_protocol::{LiveEvent, Message, SendMessageRequest};

use crate::attachment::Attachment;
use crate::error::ClientError;

/// Identifies one history fetch. Completions carrying an older ticket are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    LoadingHistory { peer: String, ticket: FetchTicket },
    Ready { peer: String },
}

/// A send accepted locally, ready to go over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub peer: String,
    pub request: SendMessageRequest,
}

#[derive(Debug)]
pub struct ChatSession {
    user_id: String,
    state: SessionState,
    messages: Vec<Message>,
    online_user_ids: Vec<String>,
    pending_send: bool,
    attachment: Option<Attachment>,
    next_ticket: u64,
}

impl ChatSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SessionState::Idle,
            messages: Vec::new(),
            online_user_ids: Vec::new(),
            pending_send: false,
            attachment: None,
            next_ticket: 0,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Peer of the conversation being loaded or shown.
    pub fn selected_peer(&self) -> Option<&str> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::LoadingHistory { peer, .. } | SessionState::Ready { peer } => Some(peer),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn online_user_ids(&self) -> &[String] {
        &self.online_user_ids
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online_user_ids.iter().any(|id| id == user_id)
    }

    pub fn pending_send(&self) -> bool {
        self.pending_send
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Open the conversation with `peer`. Clears the visible messages and
    /// returns the ticket the history fetch must complete with.
    pub fn select_peer(&mut self, peer: impl Into<String>) -> FetchTicket {
        self.next_ticket += 1;
        let ticket = FetchTicket(self.next_ticket);
        self.messages.clear();
        self.state = SessionState::LoadingHistory {
            peer: peer.into(),
            ticket,
        };
        ticket
    }

    /// Leave the current conversation. A history fetch still in flight
    /// becomes stale.
    pub fn deselect(&mut self) {
        self.messages.clear();
        self.state = SessionState::Idle;
    }

    /// Complete a history fetch. Returns false if `ticket` is stale.
    pub fn history_loaded(&mut self, ticket: FetchTicket, messages: Vec<Message>) -> bool {
        let peer = match &self.state {
            SessionState::LoadingHistory { peer, ticket: current } if *current == ticket => {
                peer.clone()
            }
            _ => {
                tracing::debug!(?ticket, "Ignoring stale history result");
                return false;
            }
        };

        self.messages = messages;
        self.state = SessionState::Ready { peer };
        true
    }

    /// Fail a history fetch. Returns false if `ticket` is stale.
    pub fn history_failed(&mut self, ticket: FetchTicket) -> bool {
        match &self.state {
            SessionState::LoadingHistory { ticket: current, .. } if *current == ticket => {
                self.messages.clear();
                self.state = SessionState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Fold a live event into the session. Presence applies in any state;
    /// a chat message is appended only while its conversation is shown.
    pub fn apply_event(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Presence { connected_users } => {
                self.online_user_ids = connected_users;
            }
            LiveEvent::Chat { message } => {
                if self.in_current_conversation(&message) {
                    self.push_unique(message);
                } else {
                    tracing::debug!(message_id = %message.id, "Message outside open conversation");
                }
            }
        }
    }

    /// Replace the online set, e.g. from a presence fetch.
    pub fn set_online(&mut self, user_ids: Vec<String>) {
        self.online_user_ids = user_ids;
    }

    /// Stage an image for the next send. A rejected image leaves no
    /// attachment staged.
    pub fn attach_image(&mut self, mime: &str, bytes: Vec<u8>) -> Result<(), ClientError> {
        match Attachment::new(mime, bytes) {
            Ok(attachment) => {
                self.attachment = Some(attachment);
                Ok(())
            }
            Err(err) => {
                self.attachment = None;
                Err(err)
            }
        }
    }

    pub fn clear_attachment(&mut self) {
        self.attachment = None;
    }

    /// Validate a send locally and mark it in flight.
    pub fn begin_send(&mut self, text: Option<&str>) -> Result<OutgoingMessage, ClientError> {
        if self.pending_send {
            return Err(ClientError::Busy);
        }

        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && self.attachment.is_none() {
            return Err(ClientError::Rejected(
                "Type a message or attach an image first.".to_string(),
            ));
        }

        let peer = match &self.state {
            SessionState::Ready { peer } => peer.clone(),
            _ => {
                return Err(ClientError::Rejected(
                    "Select a conversation first.".to_string(),
                ))
            }
        };

        self.pending_send = true;
        Ok(OutgoingMessage {
            peer,
            request: SendMessageRequest {
                text: text.map(str::to_string),
                image: self.attachment.as_ref().map(Attachment::to_data_url),
            },
        })
    }

    /// Settle the in-flight send. On success the stored message is appended
    /// (if its conversation is still open) and the attachment is cleared. On
    /// failure nothing is appended and the attachment stays staged.
    pub fn complete_send(
        &mut self,
        outcome: Result<Message, ClientError>,
    ) -> Result<Message, ClientError> {
        self.pending_send = false;
        let message = outcome?;

        self.attachment = None;
        if self.in_current_conversation(&message) {
            self.push_unique(message.clone());
        }
        Ok(message)
    }

    fn in_current_conversation(&self, message: &Message) -> bool {
        match &self.state {
            SessionState::Ready { peer } => message.is_between(&self.user_id, peer),
            _ => false,
        }
    }

    // A self-addressed message arrives both as the send result and as a push
    fn push_unique(&mut self, message: Message) {
        if !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message);
        }
    }
}
