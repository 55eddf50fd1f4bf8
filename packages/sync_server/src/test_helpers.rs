use axum::body::Body;
use axum::http::Request;

use crate::AppState;
use crate::config::{FileConfig, ServerConfig};
use crate::db::Database;
use crate::identity::PARTICIPANT_HEADER;

/// Build a fully-wired `AppState` backed by an in-memory SQLite database.
pub async fn test_app_state() -> AppState {
    let db = Database::in_memory().await.expect("in-memory sqlite");
    AppState::new(ServerConfig::from_file(&FileConfig::default()), db)
}

/// App state with `u-alice`, `u-bob` and `u-carol` profiles registered.
pub async fn seeded_app_state() -> AppState {
    let state = test_app_state().await;
    for (id, name) in [("u-alice", "Alice"), ("u-bob", "Bob"), ("u-carol", "Carol")] {
        state
            .repository
            .upsert_user(id, name, None)
            .await
            .expect("seed user");
    }
    state
}

/// Request carrying the caller identity header and an optional JSON body.
pub fn as_participant(
    method: &str,
    uri: &str,
    participant: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(PARTICIPANT_HEADER, participant);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
