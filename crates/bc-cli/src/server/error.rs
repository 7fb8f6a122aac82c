use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bc_engine::ChangeError;
use serde_json::json;
use thiserror::Error;

/// Failure of one HTTP request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("process timeout")]
    Timeout(#[source] ChangeError),

    #[error("internal server error")]
    Internal(#[source] ChangeError),
}

impl From<ChangeError> for ApiError {
    fn from(err: ChangeError) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err)
        } else {
            ApiError::Internal(err)
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Timeout(_) => "PROCESS_TIMEOUT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Logs the failure with its full cause chain. Client-facing messages
    /// never carry upstream details.
    pub fn log(&self, route: &'static str) {
        match self {
            ApiError::BadRequest(msg) => tracing::debug!(route, %msg, "rejected request"),
            ApiError::Timeout(source) => {
                tracing::warn!(route, error = %error_chain(source), "request timed out")
            }
            ApiError::Internal(source) => {
                tracing::error!(route, error = %error_chain(source), "request failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

/// `outer: inner: root` rendering of an error and its sources.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        cause = inner.source();
    }
    rendered
}
