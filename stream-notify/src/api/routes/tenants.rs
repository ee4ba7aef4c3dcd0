//! Per-tenant streamer subscriptions.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::domain::TenantId;
use crate::registry::TrackedStreamer;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{tenant_id}/streamers", get(list_streamers).post(add_streamer))
        .route("/{tenant_id}/streamers/{login}", delete(remove_streamer))
}

#[derive(Debug, Deserialize)]
pub struct AddStreamerRequest {
    pub login: String,
}

#[derive(Debug, Serialize)]
pub struct StreamerResponse {
    pub login: String,
    pub userid: String,
}

async fn list_streamers(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Vec<TrackedStreamer>>> {
    let tenant_id = TenantId::parse(tenant_id)?;
    Ok(Json(state.subscriptions.list(&tenant_id).await?))
}

async fn add_streamer(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<AddStreamerRequest>,
) -> ApiResult<(StatusCode, Json<StreamerResponse>)> {
    let tenant_id = TenantId::parse(tenant_id)?;
    let entity = state.subscriptions.add(&tenant_id, &request.login).await?;
    Ok((
        StatusCode::CREATED,
        Json(StreamerResponse {
            login: entity.display_name,
            userid: entity.stable_id,
        }),
    ))
}

async fn remove_streamer(
    State(state): State<AppState>,
    Path((tenant_id, login)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let tenant_id = TenantId::parse(tenant_id)?;
    state.subscriptions.remove(&tenant_id, &login).await?;
    Ok(StatusCode::NO_CONTENT)
}
