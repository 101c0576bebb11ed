//! Outbound login code delivery.
//!
//! Delivery is fire-and-forget from the issuer's point of view: a failed send
//! is logged and the challenge id is still returned, so the response never
//! reveals anything about the address.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FROM_NAME: &str = "FitQ Studio";

#[derive(Clone, Debug)]
pub struct LoginCodeMessage {
    pub email: String,
    pub code: String,
    pub challenge_id: Uuid,
    /// One-click link carrying the challenge id and code.
    pub login_url: String,
}

impl LoginCodeMessage {
    #[must_use]
    pub fn new(frontend_base_url: &str, email: &str, code: &str, challenge_id: Uuid) -> Self {
        let base = frontend_base_url.trim_end_matches('/');
        Self {
            email: email.to_string(),
            code: code.to_string(),
            challenge_id,
            login_url: format!("{base}/login?challenge={challenge_id}&code={code}"),
        }
    }

    fn text_body(&self) -> String {
        format!(
            "Your FitQ login code: {}\n\nOr sign in with one click: {}\n\nThe code expires in 10 minutes.",
            self.code, self.login_url
        )
    }
}

pub trait Mailer: Send + Sync {
    fn send_login_code<'a>(
        &'a self,
        message: &'a LoginCodeMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Development mailer: logs the code instead of sending it.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_login_code<'a>(
        &'a self,
        message: &'a LoginCodeMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(
                to_email = %message.email,
                challenge_id = %message.challenge_id,
                code = %message.code,
                login_url = %message.login_url,
                "login code mail stub"
            );
            Ok(())
        })
    }
}

pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: SecretString,
    from_address: String,
    endpoint: String,
}

impl SendGridMailer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString, from_address: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(SEND_TIMEOUT)
            .build()
            .context("failed to build mail client")?;
        Ok(Self {
            client,
            api_key,
            from_address,
            endpoint: SENDGRID_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn send(&self, message: &LoginCodeMessage) -> Result<()> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": message.email }] }],
            "from": { "email": self.from_address, "name": FROM_NAME },
            "subject": "FitQ login code",
            "content": [{ "type": "text/plain", "value": message.text_body() }],
        });
        self.client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("mail request failed")?
            .error_for_status()
            .context("mail provider rejected message")?;
        Ok(())
    }
}

impl Mailer for SendGridMailer {
    fn send_login_code<'a>(
        &'a self,
        message: &'a LoginCodeMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.send(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn message() -> LoginCodeMessage {
        LoginCodeMessage::new("https://fitq.app/", "a@example.com", "123456", Uuid::nil())
    }

    #[test]
    fn login_url_carries_challenge_and_code() {
        assert_eq!(
            message().login_url,
            "https://fitq.app/login?challenge=00000000-0000-0000-0000-000000000000&code=123456"
        );
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() -> Result<()> {
        LogMailer.send_login_code(&message()).await
    }

    #[tokio::test]
    async fn sendgrid_posts_with_bearer_key() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer sg-key"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = SendGridMailer::new(
            SecretString::from("sg-key".to_string()),
            "no-reply@fitq.app".to_string(),
        )?
        .with_endpoint(format!("{}/v3/mail/send", server.uri()));
        mailer.send_login_code(&message()).await
    }

    #[tokio::test]
    async fn sendgrid_rejection_is_an_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let mailer = SendGridMailer::new(
            SecretString::from("bad-key".to_string()),
            "no-reply@fitq.app".to_string(),
        )?
        .with_endpoint(server.uri());
        assert!(mailer.send_login_code(&message()).await.is_err());
        Ok(())
    }
}
