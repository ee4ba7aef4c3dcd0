//! Logging API routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::logging::available_modules;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_log_filter))
}

/// Request to update the log filter.
#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub available_modules: Vec<ModuleInfo>,
}

fn response(filter: String) -> LoggingConfigResponse {
    let modules = available_modules()
        .into_iter()
        .map(|(name, desc)| ModuleInfo {
            name: name.to_string(),
            description: desc.to_string(),
        })
        .collect();
    LoggingConfigResponse {
        filter,
        available_modules: modules,
    }
}

pub async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    Ok(Json(response(logging_config.get_filter())))
}

pub async fn update_log_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let logging_config = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))?;

    logging_config.set_filter(&request.filter)?;
    Ok(Json(response(logging_config.get_filter())))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use tracing_subscriber::{EnvFilter, reload};

    use crate::api::routes::{create_router, test_support};
    use crate::logging::{DEFAULT_LOG_FILTER, LoggingConfig};

    fn put(body: &str) -> Request<Body> {
        Request::put("/api/logging")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_update_filter() {
        let dir = TempDir::new().unwrap();
        let (_layer, handle) = reload::Layer::new(EnvFilter::new(DEFAULT_LOG_FILTER));
        let state = test_support::state(&dir)
            .await
            .with_logging_config(Arc::new(LoggingConfig::new(handle, None)));
        let app = create_router(state);

        let ok = app
            .clone()
            .oneshot(put(r#"{ "filter": "stream_notify=debug" }"#))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let invalid = app
            .oneshot(put(r#"{ "filter": "stream_notify=loud" }"#))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_missing_logging_config() {
        let dir = TempDir::new().unwrap();
        let app = create_router(test_support::state(&dir).await);

        let response = app
            .oneshot(Request::get("/api/logging").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
