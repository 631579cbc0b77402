//! Shared error-to-response mapping for the API surface.
//!
//! Specific internal reasons (which credential check failed, what the
//! database said) stay in the logs; the client sees only the generic
//! message for its status class.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub(crate) enum ApiError {
    /// Malformed input, caught before any side effect.
    Validation(&'static str),
    /// Missing, expired, or tampered session.
    Unauthorized,
    /// Credential mismatch of any kind; never more specific than this.
    InvalidCredentials,
    /// Duplicate email. The message may be specific since the callers that
    /// surface it are either the owner or an admin.
    Conflict(&'static str),
    NotFound,
    /// Anything else. Full detail logged server-side, generic message out.
    Unexpected(anyhow::Error),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Validation(message) | Self::Conflict(message) => message,
            Self::Unauthorized => "Unauthorized",
            Self::InvalidCredentials => "Invalid credentials",
            Self::NotFound => "Not found",
            Self::Unexpected(err) => {
                error!("unexpected failure: {err:#}");
                "Something went wrong"
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unexpected(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_taxonomy() {
        assert_eq!(ApiError::Validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Unexpected(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unexpected_detail_never_reaches_the_body() {
        let response = ApiError::Unexpected(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
