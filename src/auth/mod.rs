//! Credential core.
//!
//! Nothing in here knows about HTTP. Handlers hand in plain strings (cookie
//! values, bearer tokens, codes) and get back typed results.
//!
//! ## Credential channels
//!
//! A client holds at most two refresh credentials: its own and, for an admin
//! in the middle of an impersonation, a second one for the target user. The
//! impersonation credential speaks for the client while present; logging out
//! of it never touches the admin's own session.
//!
//! ## Secrets
//!
//! The signing secret is loaded once at startup. Rotating it invalidates every
//! outstanding access token and OAuth state, which is acceptable because both
//! are short-lived. Refresh tokens are opaque and unaffected.

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod impersonation;
pub mod login_code;
pub mod mail;
pub mod oauth;
pub mod policy;
pub mod rate_limit;
pub mod session;
pub mod store;
pub mod token;
pub mod utils;

use anyhow::Result;
use chrono::Duration;
use secrecy::SecretString;
use std::sync::Arc;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use credential::{resolve_active_credential, ActiveCredential, CredentialJar, CredentialKind};
pub use error::{AuthError, AuthResult, ImpersonationError};
pub use impersonation::{ImpersonationGrant, ImpersonationManager};
pub use login_code::LoginCodeIssuer;
pub use mail::{LogMailer, Mailer, SendGridMailer};
pub use oauth::{OAuthExchange, OAuthProvider, ProviderConfig};
pub use policy::{DomainAllowlist, EnrollmentPolicy, OpenEnrollment};
pub use rate_limit::{NoopRateLimiter, RateLimiter, WindowRateLimiter};
pub use session::{IssuedCredentials, Principal, SessionManager};
pub use store::{Backend, CredentialStore, DeviceContext, MemoryCredentialStore, PgCredentialStore};
pub use token::TokenCodec;

/// The four credential services over one store.
pub struct AuthState<S> {
    pub sessions: SessionManager<S>,
    pub login_codes: LoginCodeIssuer<S>,
    pub oauth: OAuthExchange<S>,
    pub impersonation: ImpersonationManager<S>,
}

impl<S: CredentialStore> AuthState<S> {
    #[must_use]
    pub fn builder(store: Arc<S>, config: AuthConfig, signing_secret: SecretString) -> AuthStateBuilder<S> {
        AuthStateBuilder::new(store, config, signing_secret)
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        self.sessions.config()
    }
}

/// Wires collaborators into an [`AuthState`]. Defaults: system clock, open
/// enrollment, in-process rate limiter from the config, log mailer, no OAuth
/// providers.
pub struct AuthStateBuilder<S> {
    store: Arc<S>,
    config: AuthConfig,
    signing_secret: SecretString,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn EnrollmentPolicy>,
    limiter: Option<Arc<dyn RateLimiter>>,
    mailer: Arc<dyn Mailer>,
    providers: Vec<(OAuthProvider, ProviderConfig)>,
}

impl<S: CredentialStore> AuthStateBuilder<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: AuthConfig, signing_secret: SecretString) -> Self {
        Self {
            store,
            config,
            signing_secret,
            clock: Arc::new(SystemClock),
            policy: Arc::new(OpenEnrollment),
            limiter: None,
            mailer: Arc::new(LogMailer),
            providers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn EnrollmentPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_oauth_provider(mut self, provider: OAuthProvider, config: ProviderConfig) -> Self {
        self.providers.push((provider, config));
        self
    }

    /// # Errors
    /// Returns an error for an empty signing secret or if the OAuth HTTP
    /// client cannot be built.
    pub fn build(self) -> Result<AuthState<S>> {
        let codec = Arc::new(TokenCodec::new(&self.signing_secret, self.clock.clone())?);
        let limiter = self.limiter.unwrap_or_else(|| {
            Arc::new(WindowRateLimiter::new(
                self.config.login_code_rate_limit(),
                Duration::seconds(self.config.login_code_rate_window_seconds()),
                self.clock.clone(),
            ))
        });

        let sessions = SessionManager::new(self.store, codec.clone(), self.policy, self.config);
        let login_codes = LoginCodeIssuer::new(sessions.clone(), limiter, self.mailer);
        let oauth = self
            .providers
            .into_iter()
            .fold(OAuthExchange::new(sessions.clone(), codec)?, |oauth, (provider, config)| {
                oauth.with_provider(provider, config)
            });
        let impersonation = ImpersonationManager::new(sessions.clone(), self.clock);

        Ok(AuthState {
            sessions,
            login_codes,
            oauth,
            impersonation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn builder_wires_services_over_one_store() -> Result<()> {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryCredentialStore::new(clock.clone()));
        let state = AuthState::builder(
            store.clone(),
            AuthConfig::new("http://localhost:3000".to_string()),
            SecretString::from("secret".to_string()),
        )
        .with_clock(clock)
        .build()?;

        let issued = state
            .sessions
            .login_email("a@example.com", None, DeviceContext::default())
            .await?;
        assert_eq!(store.user_count().await, 1);
        assert!(state.sessions.verify_access(&issued.access_token).is_ok());
        assert!(state.oauth.enabled_providers().is_empty());
        Ok(())
    }

    #[test]
    fn empty_signing_secret_is_rejected() {
        let store = Arc::new(MemoryCredentialStore::new(Arc::new(SystemClock)));
        let built = AuthState::builder(
            store,
            AuthConfig::new("http://localhost:3000".to_string()),
            SecretString::from(String::new()),
        )
        .build();
        assert!(built.is_err());
    }
}
