//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub components: Vec<ComponentHealth>,
}

/// Healthy when a Twitch token is held and notifications leave the process.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let has_token = state.credentials.current().is_some();
    let delivering = state.dispatcher.is_delivering();

    let components = vec![
        ComponentHealth {
            name: "twitch".to_string(),
            status: if has_token { "healthy" } else { "unhealthy" }.to_string(),
            message: (!has_token).then(|| "no app access token".to_string()),
        },
        ComponentHealth {
            name: "notifier".to_string(),
            status: if delivering { "healthy" } else { "degraded" }.to_string(),
            message: Some(format!("channel: {}", state.dispatcher.channel_type())),
        },
    ];

    let status = match (has_token, delivering) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    })
}
