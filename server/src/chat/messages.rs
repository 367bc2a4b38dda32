//! REST endpoints for sending and retrieving direct messages.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use campus_chat_protocol::{HistoryResponse, SendMessageRequest, SendMessageResponse};

use crate::auth::middleware::Claims;
use crate::chat::history::{normalize_text, validate_draft};
use crate::error::ChatError;
use crate::state::AppState;

/// GET /api/messages/{peer_user_id}
/// Full conversation between the caller and the peer, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_user_id): Path<String>,
) -> Result<Json<HistoryResponse>, ChatError> {
    let messages = state.history.query(&claims.sub, &peer_user_id).await?;

    tracing::debug!(
        user_id = %claims.sub,
        peer_id = %peer_user_id,
        count = messages.len(),
        "History fetched"
    );

    Ok(Json(HistoryResponse {
        success: true,
        message: "Messages fetched successfully".to_string(),
        messages,
    }))
}

/// POST /api/messages/send/{peer_user_id}
/// Body: { "text"?: string, "image"?: data URL }
/// Uploads the image (if any), persists the message, then pushes it to the
/// peer's live connection. Persistence completes before delivery starts.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_user_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ChatError> {
    let sender_id = claims.sub;
    let text = normalize_text(body.text);
    let image = body.image.filter(|data| !data.trim().is_empty());

    // Cheap checks first so a rejected send never leaves an orphan upload
    validate_draft(&peer_user_id, text.as_deref(), image.is_some())?;
    state
        .history
        .check_participants(&sender_id, &peer_user_id)
        .await?;

    let image_url = match image {
        Some(data_url) => Some(state.media.store_data_url(&data_url).await?),
        None => None,
    };

    let appended = state
        .history
        .append(&sender_id, &peer_user_id, text, image_url.clone())
        .await;
    let message = match appended {
        Ok(message) => message,
        Err(err) => {
            if let Some(url) = &image_url {
                state.media.discard(url).await;
            }
            return Err(err);
        }
    };

    let outcome = state.router.deliver(&message);

    tracing::info!(
        message_id = %message.id,
        sender_id = %message.sender_id,
        receiver_id = %message.receiver_id,
        delivery = ?outcome,
        "Message sent"
    );

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}
