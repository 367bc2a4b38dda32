//! Campus chat client library.
//!
//! `ChatController` is the entry point for a UI: it owns the signed-in
//! identity, a `ChatSession` and the live channel, and talks to the server
//! through the `ChatApi` and `LiveConnector` seams.

pub mod api;
pub mod attachment;
pub mod controller;
pub mod error;
pub mod live;
pub mod session;

pub use api::{ChatApi, HttpChatApi};
pub use attachment::{Attachment, MAX_ATTACHMENT_BYTES};
pub use controller::{ChatController, Identity};
pub use error::ClientError;
pub use live::{LiveChannel, LiveConnector, LiveSignal, WsConnector};
pub use session::{ChatSession, FetchTicket, OutgoingMessage, SessionState};
