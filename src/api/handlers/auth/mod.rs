//! Auth handlers.
//!
//! Thin adapters: parse cookies, headers and JSON, call the credential core,
//! and translate the result into status codes and `Set-Cookie` headers.
//!
//! ## Cookies
//!
//! - `fitq_refresh`: the client's own refresh credential (1 year).
//! - `fitq_impersonate`: an impersonation credential (4 hours). When present
//!   it takes precedence for `/refresh`, `/logout` and `/me`.
//! - `fitq_oauth_cv`: PKCE verifier between the authorize redirect and the
//!   callback (10 minutes). Cleared on every callback.

pub mod cookies;
pub mod email_code;
pub mod error;
pub mod impersonate;
pub mod oauth;
pub mod session;
pub mod types;
pub mod utils;

use axum::{
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::auth::{AuthState, Backend, CredentialKind, IssuedCredentials};

pub type SharedAuth = Arc<AuthState<Backend>>;

/// JSON body plus the cookie carrying the new refresh credential.
pub(crate) fn credentials_response<T: Serialize>(
    auth: &SharedAuth,
    issued: &IssuedCredentials,
    body: T,
) -> Response {
    let config = auth.config();
    let max_age = match issued.kind {
        CredentialKind::Regular => config.refresh_ttl_seconds(),
        // Impersonation credentials never outlive their original expiry.
        CredentialKind::Impersonation => (issued.refresh_expires_at - Utc::now())
            .num_seconds()
            .max(0),
    };
    let cookie = match cookies::set_cookie(
        cookies::cookie_name(issued.kind),
        &issued.refresh_token,
        max_age,
        config.cookie_secure(),
    ) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build credential cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    (StatusCode::OK, headers, Json(body)).into_response()
}

pub(crate) fn missing_payload() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(types::ErrorResponse {
            message: "Missing payload".to_string(),
        }),
    )
        .into_response()
}
