use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::email_code::request_code,
        auth::email_code::verify_code,
        auth::oauth::start,
        auth::oauth::callback,
        auth::session::refresh,
        auth::session::logout,
        auth::session::me,
        auth::session::list_sessions,
        auth::session::revoke_session,
        auth::session::revoke_all_sessions,
        auth::impersonate::issue,
        auth::impersonate::consume,
    ),
    components(schemas(
        health::Health,
        auth::types::ErrorResponse,
        auth::types::EmailCodeRequest,
        auth::types::EmailCodeResponse,
        auth::types::EmailCodeVerifyRequest,
        auth::types::AccessTokenResponse,
        auth::types::MeResponse,
        auth::types::SessionView,
        auth::types::SessionListResponse,
        auth::types::RevokeAllResponse,
        auth::types::UserSummary,
        auth::types::ImpersonateIssueRequest,
        auth::types::ImpersonateIssueResponse,
        auth::types::ImpersonateConsumeRequest,
        auth::types::ImpersonateConsumeResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Login, refresh and logout"),
        (name = "oauth", description = "Federated login"),
        (name = "sessions", description = "Device session management"),
        (name = "admin", description = "Admin-only operations")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/auth/email-code/request",
            "/v1/auth/email-code/verify",
            "/v1/auth/oauth/{provider}",
            "/v1/auth/oauth/{provider}/callback",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/me",
            "/v1/auth/sessions",
            "/v1/auth/sessions/{id}",
            "/v1/admin/impersonate",
            "/v1/auth/impersonate",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = openapi();
        let schemes = doc
            .components
            .map(|components| components.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("bearer"));
    }
}
