//! Health check HTTP route handlers
//!
//! Provides endpoints for checking the health of the server:
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Kubernetes-style liveness probe
//! - `GET /health/ready` - Readiness check with live session/connection counts

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::websocket::{ConnectionManager, SessionRegistry};

/// Shared application state for health check handlers
#[derive(Clone)]
pub struct HealthState {
    pub registry: SessionRegistry,
    pub connections: ConnectionManager,
}

impl HealthState {
    pub fn new(registry: SessionRegistry, connections: ConnectionManager) -> Self {
        Self {
            registry,
            connections,
        }
    }
}

/// Create health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .with_state(state)
}

/// Simple health check - always returns OK if the server is running
async fn simple_health() -> &'static str {
    "OK"
}

/// Liveness probe for Kubernetes
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe
///
/// The server holds no external dependencies; readiness reports the live
/// session and connection counts for observability.
async fn readiness_probe(State(state): State<HealthState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "sessions": state.registry.session_count(),
        "listeners": state.registry.listener_count(),
        "connections": state.connections.total_connections(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_simple_health() {
        let response = simple_health().await;
        assert_eq!(response, "OK");
    }

    #[tokio::test]
    async fn test_liveness_probe() {
        let response = liveness_probe().await;
        let json = response.into_response();
        assert_eq!(json.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_reports_counts() {
        let state = HealthState::new(SessionRegistry::new(), ConnectionManager::new());
        state.registry.create("room", uuid::Uuid::new_v4()).unwrap();

        let response = readiness_probe(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
