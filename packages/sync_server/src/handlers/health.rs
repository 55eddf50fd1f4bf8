use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();
    let online_participants = state.relay.online_count().await as u64;

    let status = if snapshot.errors.websocket == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        connections: snapshot.connections.active,
        online_participants,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe - returns 200 once the database answers
pub async fn health_ready_handler(State(state): State<AppState>) -> Response {
    if state.db.ping().await {
        Json(serde_json::json!({
            "status": "ready",
            "database": "connected"
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected"
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_helpers::{body_json, test_app_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_online_participants() {
        let state = test_app_state().await;
        let (conn, _rx) = state.relay.connect().await;
        state.relay.register(&conn, "u-1").await.unwrap();
        let app = build_router(state).unwrap();

        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["online_participants"], 1);
    }

    #[tokio::test]
    async fn test_live_and_ready() {
        let app = build_router(test_app_state().await).unwrap();

        let resp = app.clone().oneshot(get("/health/live")).await.unwrap();
        assert_eq!(body_json(resp).await["status"], "alive");

        let resp = app.oneshot(get("/health/ready")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["database"], "connected");
    }

    #[tokio::test]
    async fn test_metrics_snapshot_shape() {
        let state = test_app_state().await;
        state.metrics.malformed_frame();
        let app = build_router(state).unwrap();

        let resp = app.oneshot(get("/metrics")).await.unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["relay"]["malformed"], 1);
        assert_eq!(json["connections"]["active"], 0);
    }
}
