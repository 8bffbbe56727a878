//! Trigger handlers

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use url::Url;

use crate::purge::ChangeEvent;

use super::AppState;
use super::error::ApiError;
use super::models::{EventsRequest, PurgeUrlRequest};

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn purge_all(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.trigger.trigger_full_purge().await?;
    Ok(Json(report.summary()))
}

pub async fn purge_url(
    State(state): State<AppState>,
    Json(payload): Json<PurgeUrlRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = payload.url.trim();
    match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some_and(|host| !host.is_empty()) => {}
        Ok(_) => return Err(ApiError::invalid_url(format!("`{url}` has no host"))),
        Err(err) => return Err(ApiError::invalid_url(format!("`{url}`: {err}"))),
    }

    let report = state.trigger.trigger_url_purge(url).await?;
    Ok(Json(report.summary()))
}

pub async fn flush_object_cache(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.trigger.trigger_object_cache_flush().await?;
    Ok(Json(report.summary()))
}

pub async fn record_events(
    State(state): State<AppState>,
    Json(payload): Json<EventsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.events.is_empty() {
        return Err(ApiError::bad_request(
            "At least one event is required",
            None,
        ));
    }

    let events: Vec<ChangeEvent> = payload.events.into_iter().map(ChangeEvent::from).collect();
    let report = state.trigger.events(events).await?;
    Ok(Json(report.summary()))
}
