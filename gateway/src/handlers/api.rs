use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Health status response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "OK" while the server is accepting requests
    pub status: String,
    /// Relay connections with a bound upstream session
    pub active_sessions: usize,
    /// Whether an upstream connector is configured
    pub upstream_configured: bool,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        active_sessions: state.active_session_count(),
        upstream_configured: state.connector.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::SessionInfo;
    use std::time::Instant;

    #[tokio::test]
    async fn test_health_counts_sessions() {
        let state = AppState::with_connector(ServerConfig::default(), None);
        state.sessions.insert(
            uuid::Uuid::new_v4(),
            SessionInfo {
                voice: "Puck".to_string(),
                started_at: Instant::now(),
            },
        );

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.status, "OK");
        assert_eq!(health.active_sessions, 1);
        assert!(!health.upstream_configured);
    }
}
