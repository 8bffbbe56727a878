//! HTTP trigger surface.

pub mod error;
mod handlers;
mod middleware;
pub mod models;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::purge::PurgeTrigger;

#[derive(Clone)]
pub struct AppState {
    pub trigger: PurgeTrigger,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/purge/all", post(handlers::purge_all))
        .route("/purge/url", post(handlers::purge_url))
        .route("/purge/object-cache", post(handlers::flush_object_cache))
        .route("/events", post(handlers::record_events))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
