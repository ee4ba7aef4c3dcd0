//! Live status introspection.

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::domain::TenantId;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/twitch", get(twitch))
        .route("/discord", get(discord))
}

/// `{ tenantId: { login: live } }` for every known tenant.
async fn status(
    State(state): State<AppState>,
) -> ApiResult<Json<BTreeMap<TenantId, BTreeMap<String, bool>>>> {
    Ok(Json(state.registry.status_snapshot().await?))
}

async fn twitch(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "token": state.credentials.current().is_some() }))
}

async fn discord(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "connected": state.dispatcher.is_delivering() }))
}
