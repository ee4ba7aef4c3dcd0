//! API route modules.
//!
//! Organizes routes by resource type.

pub mod health;
pub mod logging;
pub mod status;
pub mod tenants;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(status::router())
        .merge(health::router())
        .nest("/api/tenants", tenants::router())
        .nest("/api/logging", logging::router())
        .with_state(state)
}
