use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub store: StoreHealth,
}

#[derive(Serialize)]
pub struct StoreHealth {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Reports `degraded` with 503 when the store does not answer PING.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connected = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check: store ping failed: {}", e);
            false
        }
    };

    let (status_code, status) = if connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now().to_rfc3339(),
        store: StoreHealth {
            connected,
            prefix: state.store.prefix().map(str::to_string),
        },
    };

    (status_code, Json(response))
}
