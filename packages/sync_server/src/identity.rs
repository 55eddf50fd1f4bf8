//! Caller identity for REST handlers.
//!
//! Credential issuance is external; whatever sits in front of the server
//! authenticates the caller and forwards the participant id in a header.

use axum::{Json, http::StatusCode};

pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// The authenticated participant making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> axum::extract::FromRequestParts<S> for ParticipantId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PARTICIPANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| ParticipantId(v.to_string()))
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "Participant identity required"})),
                )
            })
    }
}
