use axum::extract::ws::Message;
use campus_chat_protocol::LiveFrame;

/// Encode a live frame as a JSON text message.
pub fn encode_frame(frame: &LiveFrame) -> Option<Message> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode live frame");
            None
        }
    }
}

/// Handle an inbound text frame.
/// The live channel is push-only: clients send and fetch over REST, so
/// anything they write here is logged and dropped.
pub fn handle_text_message(text: &str, user_id: &str) {
    tracing::debug!(
        user_id = %user_id,
        "Ignoring inbound text frame: {}",
        text.chars().take(100).collect::<String>()
    );
}
