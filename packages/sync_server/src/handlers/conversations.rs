use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use sync_protocol::Conversation;
use tracing::info;

use crate::AppState;
use crate::identity::ParticipantId;
use crate::repository::StoreError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    #[serde(default)]
    recipient_id: Option<String>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    me: ParticipantId,
) -> Result<Json<Vec<Conversation>>, StoreError> {
    let conversations = state.repository.fetch_conversations(me.as_str()).await?;
    Ok(Json(conversations))
}

/// Get-or-create the conversation with `recipientId`. 201 when this request
/// created it, 200 when the pair already had one.
pub async fn create_conversation(
    State(state): State<AppState>,
    me: ParticipantId,
    Json(req): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), StoreError> {
    let recipient_id = req.recipient_id.unwrap_or_default();
    let (conversation, created) = state
        .repository
        .create_or_get_conversation(me.as_str(), &recipient_id)
        .await?;

    if created {
        info!(conversation = %conversation.id, "Conversation started");
        Ok((StatusCode::CREATED, Json(conversation)))
    } else {
        Ok((StatusCode::OK, Json(conversation)))
    }
}
