//! HTTP rendering of core errors.
//!
//! Bodies are fixed strings per kind; nothing from the underlying cause leaks.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use super::types::ErrorResponse;
use crate::auth::AuthError;

#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::InvalidCode | AuthError::InvalidEmail | AuthError::InvalidToken => {
            StatusCode::BAD_REQUEST
        }
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Forbidden | AuthError::AccessDenied => StatusCode::FORBIDDEN,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::OAuthExchangeFailed | AuthError::MissingEmail => StatusCode::BAD_GATEWAY,
        AuthError::Expired => StatusCode::GONE,
        AuthError::AlreadyUsed => StatusCode::CONFLICT,
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            AuthError::Internal(err) => {
                error!("Internal error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(&AuthError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::InvalidCode), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&AuthError::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(&AuthError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&AuthError::MissingEmail), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(&AuthError::AlreadyUsed), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let response = AuthError::Internal(anyhow::anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
