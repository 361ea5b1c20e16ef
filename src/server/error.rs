// HTTP error mapping
//
// Every failure the /ask handler can produce, mapped 1:1 to a status code
// and a `{"detail": ...}` body.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Header carrying the JSON phase record on timeouts
pub const PHASES_HEADER: &str = "x-phases";

#[derive(Debug)]
pub enum ApiError {
    /// Missing, empty or malformed question (400)
    InvalidRequest(String),
    /// Deadline expired at the floor tier (504). `phases` is the JSON record.
    Timeout { phases: String },
    /// Runtime could not fit the model in memory (503)
    ResourceExhausted(String),
    /// Runtime unreachable or returned an error (502)
    Transport(String),
    /// Anything else (500)
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Transport(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApiError::InvalidRequest(msg)
            | ApiError::ResourceExhausted(msg)
            | ApiError::Transport(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::Timeout { .. } => "LLM request timed out",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.detail() }));
        let mut response = (status, body).into_response();

        if let ApiError::Timeout { phases } = &self {
            match HeaderValue::from_str(phases) {
                Ok(value) => {
                    response
                        .headers_mut()
                        .insert(HeaderName::from_static(PHASES_HEADER), value);
                }
                Err(e) => tracing::warn!("Phase record not usable as a header value: {}", e),
            }
        }

        response
    }
}
