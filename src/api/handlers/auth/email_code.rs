//! Email login code endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::{
    credentials_response, missing_payload,
    types::{
        AccessTokenResponse, EmailCodeRequest, EmailCodeResponse, EmailCodeVerifyRequest,
        ErrorResponse,
    },
    utils::{device_context, extract_client_ip},
    SharedAuth,
};
use crate::auth::AuthError;

#[utoipa::path(
    post,
    path = "/v1/auth/email-code/request",
    request_body = EmailCodeRequest,
    responses(
        (status = 200, description = "Code sent (or silently dropped)", body = EmailCodeResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn request_code(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    payload: Option<Json<EmailCodeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    let ip = extract_client_ip(&headers);
    match auth.login_codes.request_code(&request.email, ip.as_deref()).await {
        Ok(challenge_id) => (
            StatusCode::OK,
            Json(EmailCodeResponse {
                challenge_id: challenge_id.to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/email-code/verify",
    request_body = EmailCodeVerifyRequest,
    responses(
        (status = 200, description = "Logged in; refresh cookie set", body = AccessTokenResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 403, description = "Account creation not allowed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn verify_code(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    payload: Option<Json<EmailCodeVerifyRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    // A malformed challenge id is indistinguishable from an unknown one.
    let Ok(challenge_id) = Uuid::parse_str(request.challenge_id.trim()) else {
        return AuthError::InvalidCode.into_response();
    };
    match auth
        .login_codes
        .login_with_code(challenge_id, &request.code, device_context(&headers))
        .await
    {
        Ok(issued) => credentials_response(&auth, &issued, AccessTokenResponse::from(&issued)),
        Err(err) => err.into_response(),
    }
}
