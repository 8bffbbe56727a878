//! JSON error bodies for the trigger service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::content::ContentError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const INVALID_URL: &str = "invalid_url";
    pub const CONTENT_UNAVAILABLE: &str = "content_unavailable";
    pub const CONTENT_INVALID: &str = "content_invalid";
}

/// Left in the response extensions for `log_responses`.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub code: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorFields<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorFields<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

/// A rejected or failed trigger call.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: codes::BAD_REQUEST,
            message,
            hint,
        }
    }

    pub fn invalid_url(hint: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: codes::INVALID_URL,
            message: "URL must be absolute with a host",
            hint: Some(hint.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        let (status, code, message) = match &err {
            ContentError::Parse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::CONTENT_INVALID,
                "Content snapshot is invalid",
            ),
            ContentError::Unavailable(_) | ContentError::Read { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CONTENT_UNAVAILABLE,
                "Content model unavailable",
            ),
        };
        Self {
            status,
            code,
            message,
            hint: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            error: ErrorFields {
                code: self.code,
                message: self.message,
                hint: self.hint.as_deref(),
            },
        };
        let mut response = (self.status, Json(envelope)).into_response();
        response.extensions_mut().insert(ErrorReport {
            code: self.code,
            detail: self.hint.unwrap_or_else(|| self.message.to_string()),
        });
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_errors_map_to_service_status() {
        let parse = ApiError::from(ContentError::Parse("bad toml".into()));
        assert_eq!(parse.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::from(ContentError::Unavailable("cms offline".into()));
        assert_eq!(missing.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn error_report_carries_hint() {
        let response = ApiError::invalid_url("`/about/` has no host").into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.code, codes::INVALID_URL);
        assert_eq!(report.detail, "`/about/` has no host");
    }
}
