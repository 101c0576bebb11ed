//! OAuth redirect and callback endpoints.
//!
//! Both endpoints answer with redirects. Failures send the browser to the
//! frontend login page with a coarse `error` parameter.

use axum::{
    extract::{Extension, Path, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::{
    cookies::{clear_cookie, cookie_name, read_cookie, set_cookie, OAUTH_VERIFIER_COOKIE},
    types::{OAuthCallbackQuery, OAuthStartQuery},
    utils::device_context,
    SharedAuth,
};
use crate::auth::{oauth::OAuthProvider, AuthError};

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}",
    params(
        ("provider" = String, Path, description = "google, facebook or stebby"),
        ("next" = Option<String>, Query, description = "Path to return to after login")
    ),
    responses(
        (status = 302, description = "Redirect to the identity provider"),
        (status = 404, description = "Unknown or disabled provider")
    ),
    tag = "oauth"
)]
pub async fn start(
    auth: Extension<SharedAuth>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthStartQuery>,
) -> impl IntoResponse {
    let provider = match provider.parse::<OAuthProvider>() {
        Ok(provider) => provider,
        Err(err) => return err.into_response(),
    };
    let start = match auth.oauth.start(provider, query.next.as_deref()) {
        Ok(start) => start,
        Err(err) => return err.into_response(),
    };

    let mut headers = HeaderMap::new();
    match (
        HeaderValue::from_str(&start.url),
        set_cookie(
            OAUTH_VERIFIER_COOKIE,
            &start.verifier,
            auth.config().oauth_state_ttl_seconds(),
            auth.config().cookie_secure(),
        ),
    ) {
        (Ok(location), Ok(cookie)) => {
            headers.insert(LOCATION, location);
            headers.insert(SET_COOKIE, cookie);
        }
        _ => {
            error!(provider = %provider, "Failed to build oauth redirect");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (StatusCode::FOUND, headers).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google, facebook or stebby"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "Signed state from the start redirect")
    ),
    responses(
        (status = 302, description = "Redirect to the frontend, logged in or with an error")
    ),
    tag = "oauth"
)]
pub async fn callback(
    headers: HeaderMap,
    auth: Extension<SharedAuth>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> impl IntoResponse {
    let frontend = auth.config().frontend_base_url().to_string();
    let secure = auth.config().cookie_secure();
    // The verifier is single use whatever the outcome.
    let verifier = read_cookie(&headers, OAUTH_VERIFIER_COOKIE);
    let mut cookies = Vec::new();
    if let Ok(cookie) = clear_cookie(OAUTH_VERIFIER_COOKIE, secure) {
        cookies.push(cookie);
    }

    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        return redirect(&format!("{frontend}/login?error=oauth"), cookies);
    };
    if let Some(reason) = query.error.as_deref() {
        info!(provider = %provider, "provider returned error: {reason}");
        return redirect(&format!("{frontend}/login?error=oauth"), cookies);
    }
    let (Some(code), Some(state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return redirect(&format!("{frontend}/login?error=oauth"), cookies);
    };

    match auth
        .oauth
        .complete(provider, code, state, verifier.as_deref(), device_context(&headers))
        .await
    {
        Ok(login) => {
            let issued = &login.credentials;
            match set_cookie(
                cookie_name(issued.kind),
                &issued.refresh_token,
                auth.config().refresh_ttl_seconds(),
                secure,
            ) {
                Ok(cookie) => cookies.push(cookie),
                Err(err) => {
                    error!("Failed to build refresh cookie: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            redirect(&format!("{frontend}{}", login.next_path), cookies)
        }
        Err(err) => {
            let reason = match err {
                AuthError::MissingEmail => "noemail",
                AuthError::AccessDenied => "denied",
                AuthError::Internal(err) => {
                    error!(provider = %provider, "OAuth callback failed: {err:#}");
                    "oauth"
                }
                other => {
                    warn!(provider = %provider, "OAuth callback rejected: {other}");
                    "oauth"
                }
            };
            redirect(&format!("{frontend}/login?error={reason}"), cookies)
        }
    }
}

fn redirect(location: &str, cookies: Vec<HeaderValue>) -> Response {
    let Ok(location) = HeaderValue::from_str(location) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, location);
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }
    (StatusCode::FOUND, headers).into_response()
}
