//! Route definitions for the trigger API.

use axum::{
    Router,
    routing::{get, post}
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the Axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/send-to-hikvision", post(handlers::send_to_hikvision))
        .route("/eposh-induction", post(handlers::eposh_induction))
        .route("/employees", post(handlers::create_employee))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
