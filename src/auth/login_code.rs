//! Login-Code Issuer: email one-time codes.
//!
//! Flow Overview:
//! 1) `request_code` normalizes the address, applies the `(email, ip)` rate
//!    limit, stores a hashed six-digit code, and mails it.
//! 2) The caller gets the challenge id back whether or not the mail went out,
//!    and whether or not the address belongs to anyone.
//! 3) `verify_code` consumes the code with a compare-and-set; a wrong guess
//!    burns one attempt.
//! 4) `login_with_code` hands the verified email to the Session Manager.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::{AuthError, AuthResult},
    mail::{LoginCodeMessage, Mailer},
    rate_limit::{login_code_key, RateLimitDecision, RateLimiter},
    session::{IssuedCredentials, SessionManager},
    store::{CredentialStore, DeviceContext},
    utils::{generate_login_code, normalize_email, valid_email},
};

pub struct LoginCodeIssuer<S> {
    store: Arc<S>,
    limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn Mailer>,
    sessions: SessionManager<S>,
    config: AuthConfig,
}

impl<S> Clone for LoginCodeIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            limiter: self.limiter.clone(),
            mailer: self.mailer.clone(),
            sessions: self.sessions.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: CredentialStore> LoginCodeIssuer<S> {
    #[must_use]
    pub fn new(
        sessions: SessionManager<S>,
        limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store: sessions.store().clone(),
            config: sessions.config().clone(),
            limiter,
            mailer,
            sessions,
        }
    }

    /// Issue a code for `email` and return the challenge id.
    ///
    /// # Errors
    /// `InvalidEmail` for a malformed address, `RateLimited` when the
    /// `(email, ip)` pair is over its limit. Mail failures are not errors.
    pub async fn request_code(&self, email: &str, ip: Option<&str>) -> AuthResult<Uuid> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if self.limiter.hit(&login_code_key(&email, ip)) == RateLimitDecision::Limited {
            debug!(ip = ip.unwrap_or("unknown"), "login code request rate limited");
            return Err(AuthError::RateLimited);
        }

        let code = generate_login_code();
        let record = self
            .store
            .create_login_code(
                &email,
                &code,
                Duration::seconds(self.config.login_code_ttl_seconds()),
                self.config.login_code_max_attempts(),
            )
            .await?;

        let message =
            LoginCodeMessage::new(self.config.frontend_base_url(), &email, &code, record.id);
        if let Err(err) = self.mailer.send_login_code(&message).await {
            warn!(challenge_id = %record.id, "failed to send login code: {err:#}");
        }
        Ok(record.id)
    }

    /// Consume the code and return the email it was issued for.
    ///
    /// `None` covers every failure: unknown challenge, wrong code, expired,
    /// consumed, or out of attempts.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn verify_code(&self, challenge_id: Uuid, code: &str) -> AuthResult<Option<String>> {
        // Malformed guesses go through the store too so they burn an attempt.
        Ok(self
            .store
            .consume_login_code(challenge_id, code.trim())
            .await?)
    }

    /// Verify the code and open a regular session for its email.
    ///
    /// # Errors
    /// `InvalidCode` when verification fails; otherwise whatever
    /// `SessionManager::login_email` returns.
    pub async fn login_with_code(
        &self,
        challenge_id: Uuid,
        code: &str,
        device: DeviceContext,
    ) -> AuthResult<IssuedCredentials> {
        let email = self
            .verify_code(challenge_id, code)
            .await?
            .ok_or(AuthError::InvalidCode)?;
        self.sessions.login_email(&email, None, device).await
    }
}
