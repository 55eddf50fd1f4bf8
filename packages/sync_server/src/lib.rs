//! SyncSphere relay server
//!
//! Room-based WebSocket relay for one-to-one chat, plus the REST collaborator
//! that persists conversations and messages in SQLite.

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

pub mod config;
pub mod db;
mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod relay;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::config::ServerConfig;
use crate::db::Database;
use crate::metrics::ServerMetrics;
use crate::relay::RelayHub;
use crate::repository::ChatRepository;

#[derive(Clone)]
pub struct AppState {
    /// Server runtime configuration
    pub server_config: Arc<ServerConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
    pub db: Arc<Database>,
    pub repository: Arc<ChatRepository>,
    /// Presence and room membership for every relay connection
    pub relay: Arc<RelayHub>,
}

impl AppState {
    pub fn new(server_config: ServerConfig, db: Database) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let relay = Arc::new(RelayHub::new(&server_config.relay, metrics.clone()));
        let repository = Arc::new(ChatRepository::new(db.pool.clone()));
        Self {
            server_config: Arc::new(server_config),
            metrics,
            db: Arc::new(db),
            repository,
            relay,
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
pub struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

fn cors_layer(config: &ServerConfig) -> Result<CorsLayer> {
    let Some(origin) = config.cors_origin.as_deref() else {
        return Ok(CorsLayer::permissive());
    };
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid CORS origin: {origin}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(identity::PARTICIPANT_HEADER),
        ]))
}

/// Routes for the relay, the REST collaborator and health probes.
pub fn build_router(state: AppState) -> Result<Router> {
    let cors = cors_layer(&state.server_config)?;

    let app = Router::new()
        .route("/api/ws", get(handlers::relay_websocket_handler))
        .route(
            "/api/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/api/messages", post(handlers::create_message))
        .route("/api/messages/{conversation_id}", get(handlers::get_messages))
        .route("/api/users/me", put(handlers::update_profile))
        .route("/api/users/search", get(handlers::search_users))
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/health/ready", get(handlers::health_ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors)
        .with_state(state);

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileConfig, ServerConfig};

    #[test]
    fn cors_defaults_to_permissive() {
        let config = ServerConfig::from_file(&FileConfig::default());
        assert!(cors_layer(&config).is_ok());
    }

    #[test]
    fn invalid_cors_origin_is_an_error() {
        let mut config = ServerConfig::from_file(&FileConfig::default());
        config.cors_origin = Some("bad\norigin".into());
        assert!(cors_layer(&config).is_err());
    }
}
