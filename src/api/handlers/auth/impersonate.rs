//! Impersonation endpoints.
//!
//! Issuing needs an admin bearer token. Consuming needs only the token from
//! the link; the admin's own cookie, when sent along, decides whether failures
//! are reported precisely.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};

use super::{
    cookies::credential_jar,
    credentials_response, missing_payload,
    session::bearer_user,
    types::{
        ErrorResponse, ImpersonateConsumeRequest, ImpersonateConsumeResponse,
        ImpersonateIssueRequest, ImpersonateIssueResponse, UserSummary,
    },
    utils::device_context,
    SharedAuth,
};

#[utoipa::path(
    post,
    path = "/v1/admin/impersonate",
    request_body = ImpersonateIssueRequest,
    responses(
        (status = 200, description = "Impersonation link issued", body = ImpersonateIssueResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Caller is not an admin, or target is", body = ErrorResponse),
        (status = 404, description = "Target user not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn issue(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    payload: Option<Json<ImpersonateIssueRequest>>,
) -> impl IntoResponse {
    let admin = match bearer_user(&headers, &auth).await {
        Ok(user) => user,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    match auth.impersonation.issue(&admin, request.user_id).await {
        Ok(grant) => (
            StatusCode::OK,
            Json(ImpersonateIssueResponse {
                url: grant.url,
                expires_at: grant.expires_at.to_rfc3339(),
                user: UserSummary::from(&grant.target),
            }),
        )
            .into_response(),
        Err(err) => err.for_caller(admin.is_admin).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/impersonate",
    request_body = ImpersonateConsumeRequest,
    responses(
        (status = 200, description = "Impersonation cookie set", body = ImpersonateConsumeResponse),
        (status = 403, description = "Token rejected", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn consume(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    payload: Option<Json<ImpersonateConsumeRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };
    match auth
        .impersonation
        .consume_for(&credential_jar(&headers), &request.token, device_context(&headers))
        .await
    {
        Ok(issued) => {
            let body = ImpersonateConsumeResponse {
                admin_id: issued.session.impersonated_by,
                user: UserSummary::from(&issued.user),
            };
            credentials_response(&auth, &issued, body)
        }
        Err(err) => err.into_response(),
    }
}
