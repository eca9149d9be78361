//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced as plain-text HTTP responses before streaming begins.
///
/// Once a streamed response has committed its 200, failures are conveyed
/// solely by `ERROR:` lines and the absence of the sentinel; these variants
/// cover everything that can be rejected earlier.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request: bad JSON, missing multipart parts, invalid manifest.
    #[error("bad request: {0}")]
    Protocol(String),

    /// Missing or wrong bearer token.
    #[error("unauthorized")]
    Auth,

    /// Sliding-window limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The deployment lock is held.
    #[error("deployment in progress, try again later")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    /// Responses are plain text; the client relays the body verbatim.
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
