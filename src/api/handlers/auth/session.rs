//! Refresh, logout, profile and session management endpoints.
//!
//! Cookie endpoints act on the active credential (impersonation first). Session
//! management is bearer-authenticated and scoped to the token's user.

use axum::{
    extract::{Extension, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::error;
use uuid::Uuid;

use super::{
    cookies::{clear_cookie, cookie_name, credential_jar},
    credentials_response,
    types::{
        AccessTokenResponse, ErrorResponse, MeResponse, RevokeAllResponse, SessionListResponse,
        SessionView,
    },
    utils::extract_bearer_token,
    SharedAuth,
};
use crate::auth::{resolve_active_credential, store::User, AuthError};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "Rotated; new refresh cookie set", body = AccessTokenResponse),
        (status = 401, description = "No valid refresh credential", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, auth: Extension<SharedAuth>) -> impl IntoResponse {
    let Some(credential) = resolve_active_credential(&credential_jar(&headers)) else {
        return AuthError::Unauthenticated.into_response();
    };
    match auth.sessions.refresh(&credential).await {
        Ok(issued) => credentials_response(&auth, &issued, AccessTokenResponse::from(&issued)),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Active session revoked and its cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, auth: Extension<SharedAuth>) -> impl IntoResponse {
    let Some(credential) = resolve_active_credential(&credential_jar(&headers)) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let kind = match auth.sessions.logout(&credential).await {
        Ok(kind) => kind,
        Err(err) => return err.into_response(),
    };

    // Only the channel that was used is cleared.
    let mut response_headers = HeaderMap::new();
    match clear_cookie(cookie_name(kind), auth.config().cookie_secure()) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build logout cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, auth: Extension<SharedAuth>) -> impl IntoResponse {
    match auth.sessions.me(&credential_jar(&headers)).await {
        Ok(principal) => (StatusCode::OK, Json(MeResponse::from(&principal))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Live sessions, most recently used first", body = SessionListResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn list_sessions(headers: HeaderMap, auth: Extension<SharedAuth>) -> impl IntoResponse {
    let user = match bearer_user(&headers, &auth).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match auth.sessions.list_sessions(user.id).await {
        Ok(sessions) => (
            StatusCode::OK,
            Json(SessionListResponse {
                sessions: sessions.iter().map(SessionView::from).collect(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 404, description = "No such session for this user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke_session(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = match bearer_user(&headers, &auth).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let Ok(session_id) = Uuid::parse_str(&id) else {
        return AuthError::NotFound.into_response();
    };
    match auth.sessions.revoke_session(user.id, session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "All sessions revoked", body = RevokeAllResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
pub async fn revoke_all_sessions(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
) -> impl IntoResponse {
    let user = match bearer_user(&headers, &auth).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    match auth.sessions.revoke_all_sessions(user.id).await {
        Ok(revoked) => (StatusCode::OK, Json(RevokeAllResponse { revoked })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Resolve the bearer token into a live user, or the response to send instead.
pub(super) async fn bearer_user(headers: &HeaderMap, auth: &SharedAuth) -> Result<User, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(AuthError::Unauthenticated.into_response());
    };
    auth.sessions
        .bearer_user(&token)
        .await
        .map_err(IntoResponse::into_response)
}
