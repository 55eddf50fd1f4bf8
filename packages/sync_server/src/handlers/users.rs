use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use sync_protocol::Participant;

use crate::AppState;
use crate::identity::ParticipantId;
use crate::repository::StoreError;

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    query: String,
}

/// Register or update the caller's display profile.
pub async fn update_profile(
    State(state): State<AppState>,
    me: ParticipantId,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Participant>, StoreError> {
    let profile = state
        .repository
        .upsert_user(me.as_str(), &req.name, req.email.as_deref())
        .await?;
    Ok(Json(profile))
}

pub async fn search_users(
    State(state): State<AppState>,
    me: ParticipantId,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<Participant>>, StoreError> {
    let results = state
        .repository
        .search_users(&params.query, me.as_str())
        .await?;
    Ok(Json(results))
}
