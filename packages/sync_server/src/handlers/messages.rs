use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use sync_protocol::Message;
use tracing::debug;

use crate::AppState;
use crate::identity::ParticipantId;
use crate::repository::StoreError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

pub async fn get_messages(
    State(state): State<AppState>,
    me: ParticipantId,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, StoreError> {
    let messages = state
        .repository
        .fetch_messages(&conversation_id, me.as_str())
        .await?;
    Ok(Json(messages))
}

/// Persist a message from the caller. Relaying it to the room is the
/// sender's job once it has the stored record.
pub async fn create_message(
    State(state): State<AppState>,
    me: ParticipantId,
    Json(req): Json<CreateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), StoreError> {
    let conversation_id = req.conversation_id.unwrap_or_default();
    let content = req.content.unwrap_or_default();

    let message = state
        .repository
        .create_message(&conversation_id, me.as_str(), &content)
        .await?;

    state.metrics.message_persisted();
    debug!(conversation = %message.conversation_id, message = %message.id, "Message stored");
    Ok((StatusCode::CREATED, Json(message)))
}
