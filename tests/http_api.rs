//! Router-level tests: cookies, status codes and bearer checks.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, Response, StatusCode,
    },
    Router,
};
use chrono::Utc;
use fitq::auth::{
    mail::LoginCodeMessage, store::User, AuthConfig, AuthState, Backend, Mailer, ManualClock,
    MemoryCredentialStore, NoopRateLimiter,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};
use tower::ServiceExt;

#[derive(Default)]
struct Inbox {
    sent: Mutex<Vec<LoginCodeMessage>>,
}

impl Inbox {
    fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .ok()
            .and_then(|sent| sent.last().map(|message| message.code.clone()))
    }
}

impl Mailer for Inbox {
    fn send_login_code<'a>(
        &'a self,
        message: &'a LoginCodeMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(message.clone());
            }
            Ok(())
        })
    }
}

struct App {
    router: Router,
    store: Arc<MemoryCredentialStore>,
    inbox: Arc<Inbox>,
}

impl App {
    fn new() -> Result<Self> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryCredentialStore::new(clock.clone()));
        let inbox = Arc::new(Inbox::default());
        let state = AuthState::builder(
            Arc::new(Backend::Memory(store.clone())),
            AuthConfig::new("http://localhost:3000".to_string()),
            SecretString::from("http-test-secret".to_string()),
        )
        .with_clock(clock)
        .with_rate_limiter(Arc::new(NoopRateLimiter))
        .with_mailer(inbox.clone())
        .build()?;
        Ok(Self {
            router: fitq::api::router(Arc::new(state))?,
            store,
            inbox,
        })
    }

    async fn seed_user(&self, id: i64, email: &str, is_admin: bool) {
        self.store
            .put_user(User {
                id,
                email: email.to_string(),
                display_name: None,
                is_admin,
                trainer_unlocked: false,
                created_at: Utc::now(),
                deleted_at: None,
            })
            .await;
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    /// Log in through the email-code endpoints and return (refresh cookie, access token).
    async fn login(&self, email: &str) -> Result<(String, String)> {
        let response = self
            .send(post_json(
                "/v1/auth/email-code/request",
                &json!({ "email": email }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        let challenge_id = body["challenge_id"]
            .as_str()
            .context("missing challenge id")?
            .to_string();
        let code = self.inbox.last_code().context("no code mailed")?;

        let response = self
            .send(post_json(
                "/v1/auth/email-code/verify",
                &json!({ "challenge_id": challenge_id, "code": code }),
            )?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let refresh = cookie_value(&response, "fitq_refresh").context("no refresh cookie")?;
        let body = body_json(response).await?;
        let access = body["access_token"]
            .as_str()
            .context("missing access token")?
            .to_string();
        Ok((refresh, access))
    }
}

fn post_json(uri: &str, body: &Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

fn with_cookie(method: &str, uri: &str, cookie: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(method)
        .uri(uri)
        .header(COOKIE, cookie)
        .body(Body::empty())?)
}

async fn body_json(response: Response<Body>) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Value of a cookie set by the response, `None` if not set.
fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

#[tokio::test]
async fn health_reports_memory_store() -> Result<()> {
    let app = App::new()?;
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("X-App"));
    let body = body_json(response).await?;
    assert_eq!(body["store"], "memory");
    assert_eq!(body["database"], "n/a");
    assert_eq!(body["name"], "fitq");
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = App::new()?;
    let response = app
        .send(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(body["paths"]["/v1/auth/refresh"].is_object());
    Ok(())
}

#[tokio::test]
async fn email_code_login_sets_refresh_cookie() -> Result<()> {
    let app = App::new()?;
    let (refresh, access) = app.login("new@example.com").await?;
    assert!(!refresh.is_empty());
    assert!(!access.is_empty());

    let response = app
        .send(with_cookie(
            "GET",
            "/v1/auth/me",
            &format!("fitq_refresh={refresh}"),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await?;
    assert_eq!(me["email"], "new@example.com");
    assert_eq!(me["name"], "new");
    assert_eq!(me["is_admin"], false);
    Ok(())
}

#[tokio::test]
async fn wrong_code_and_bad_input_are_generic() -> Result<()> {
    let app = App::new()?;

    let response = app
        .send(post_json(
            "/v1/auth/email-code/request",
            &json!({ "email": "not-an-email" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .send(post_json(
            "/v1/auth/email-code/verify",
            &json!({ "challenge_id": "nope", "code": "123456" }),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(body["message"], "invalid or expired code");
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_cookie() -> Result<()> {
    let app = App::new()?;
    let (r1, _) = app.login("rotate@example.com").await?;

    let response = app
        .send(with_cookie(
            "POST",
            "/v1/auth/refresh",
            &format!("fitq_refresh={r1}"),
        )?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let r2 = cookie_value(&response, "fitq_refresh").context("no rotated cookie")?;
    assert_ne!(r1, r2);
    let body = body_json(response).await?;
    assert_eq!(body["token_type"], "Bearer");

    let replay = app
        .send(with_cookie(
            "POST",
            "/v1/auth/refresh",
            &format!("fitq_refresh={r1}"),
        )?)
        .await?;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn sessions_require_bearer() -> Result<()> {
    let app = App::new()?;
    let (_, access) = app.login("devices@example.com").await?;

    let anonymous = app
        .send(
            Request::builder()
                .uri("/v1/auth/sessions")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::builder()
                .uri("/v1/auth/sessions")
                .header(AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let sessions = body["sessions"].as_array().context("no sessions")?;
    assert_eq!(sessions.len(), 1);

    let unknown = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v1/auth/sessions/{}", uuid::Uuid::new_v4()))
                .header(AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn ending_impersonation_keeps_admin_cookie() -> Result<()> {
    let app = App::new()?;
    app.seed_user(1, "admin@fitq.app", true).await;
    app.seed_user(7, "member@example.com", false).await;

    let (admin_refresh, admin_access) = app.login("admin@fitq.app").await?;

    let mut issue = post_json("/v1/admin/impersonate", &json!({ "user_id": 7 }))?;
    issue.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {admin_access}").parse()?,
    );
    let response = app.send(issue).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let grant = body_json(response).await?;
    let url = grant["url"].as_str().context("no url")?;
    let token = url
        .split_once("token=")
        .map(|(_, token)| token.to_string())
        .context("no token in url")?;

    let response = app
        .send(post_json("/v1/auth/impersonate", &json!({ "token": token }))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let impersonation =
        cookie_value(&response, "fitq_impersonate").context("no impersonation cookie")?;
    assert!(cookie_value(&response, "fitq_refresh").is_none());
    let body = body_json(response).await?;
    assert_eq!(body["admin_id"], 1);
    assert_eq!(body["user"]["id"], 7);

    let both = format!("fitq_refresh={admin_refresh}; fitq_impersonate={impersonation}");
    let me = app.send(with_cookie("GET", "/v1/auth/me", &both)?).await?;
    let me = body_json(me).await?;
    assert_eq!(me["id"], 7);
    assert_eq!(me["impersonated_by"], 1);

    let logout = app
        .send(with_cookie("POST", "/v1/auth/logout", &both)?)
        .await?;
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    assert_eq!(cookie_value(&logout, "fitq_impersonate"), Some(String::new()));
    assert!(cookie_value(&logout, "fitq_refresh").is_none());

    let me = app
        .send(with_cookie(
            "GET",
            "/v1/auth/me",
            &format!("fitq_refresh={admin_refresh}"),
        )?)
        .await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me = body_json(me).await?;
    assert_eq!(me["id"], 1);
    Ok(())
}

#[tokio::test]
async fn non_admin_cannot_issue_impersonation() -> Result<()> {
    let app = App::new()?;
    app.seed_user(7, "member@example.com", false).await;
    let (_, access) = app.login("someone@example.com").await?;

    let mut issue = post_json("/v1/admin/impersonate", &json!({ "user_id": 7 }))?;
    issue
        .headers_mut()
        .insert(AUTHORIZATION, format!("Bearer {access}").parse()?);
    let response = app.send(issue).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let consumed = app
        .send(post_json(
            "/v1/auth/impersonate",
            &json!({ "token": "made-up" }),
        )?)
        .await?;
    assert_eq!(consumed.status(), StatusCode::FORBIDDEN);
    Ok(())
}
