use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::error::ErrorReport;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Correlates a trigger call with the purge cycle logs it produced.
#[derive(Debug, Clone, Copy)]
pub struct TriggerId(pub Uuid);

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let id = TriggerId(Uuid::new_v4());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let trigger_id = request
        .extensions()
        .get::<TriggerId>()
        .map(|id| id.0.to_string())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status().as_u16();
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let report = response.extensions_mut().remove::<ErrorReport>();
    match report {
        Some(report) if response.status().is_server_error() => error!(
            target: "edgepurge::http",
            status,
            %method,
            path = %path,
            elapsed_ms,
            code = report.code,
            detail = %report.detail,
            trigger_id = %trigger_id,
            "trigger failed"
        ),
        Some(report) => warn!(
            target: "edgepurge::http",
            status,
            %method,
            path = %path,
            code = report.code,
            detail = %report.detail,
            trigger_id = %trigger_id,
            "trigger rejected"
        ),
        None => debug!(
            target: "edgepurge::http",
            status,
            %method,
            path = %path,
            elapsed_ms,
            trigger_id = %trigger_id,
            "trigger handled"
        ),
    }

    response
}
