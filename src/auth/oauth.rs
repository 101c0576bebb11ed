//! OAuth Exchange: federated login through third-party identity providers.
//!
//! Flow Overview:
//! 1) `start` creates a PKCE pair, signs a state token carrying the provider
//!    and the post-login path, and builds the authorize URL. The verifier goes
//!    back to the browser in a short-lived cookie.
//! 2) On callback, `complete` checks the state signature, expiry, and provider,
//!    exchanges the code (plus verifier for PKCE providers), and fetches the
//!    profile.
//! 3) The verified email goes to `SessionManager::login_email`, exactly like a
//!    verified login code.
//!
//! State is self-validating, so nothing is stored server side before the
//! callback.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Duration;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::{
    error::{AuthError, AuthResult},
    session::{IssuedCredentials, SessionManager},
    store::{CredentialStore, DeviceContext},
    token::TokenCodec,
    utils::{generate_token, sanitize_next_path},
};

const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    Google,
    Facebook,
    Stebby,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Stebby => "stebby",
        }
    }

    /// Human name used in device labels.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Facebook => "Facebook",
            Self::Stebby => "Stebby",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            "stebby" => Ok(Self::Stebby),
            _ => Err(AuthError::NotFound),
        }
    }
}

/// How the provider access token is presented to the userinfo endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPlacement {
    Header,
    Query,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub scope: String,
    pub pkce: bool,
    pub token_placement: TokenPlacement,
}

impl ProviderConfig {
    #[must_use]
    pub fn google(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            client_id,
            client_secret,
            redirect_uri,
            scope: "openid email profile".to_string(),
            pkce: true,
            token_placement: TokenPlacement::Header,
        }
    }

    #[must_use]
    pub fn facebook(client_id: String, client_secret: SecretString, redirect_uri: String) -> Self {
        Self {
            auth_url: "https://www.facebook.com/v17.0/dialog/oauth".to_string(),
            token_url: "https://graph.facebook.com/v17.0/oauth/access_token".to_string(),
            userinfo_url: "https://graph.facebook.com/me?fields=id,name,email".to_string(),
            client_id,
            client_secret,
            redirect_uri,
            scope: "email,public_profile".to_string(),
            pkce: false,
            token_placement: TokenPlacement::Query,
        }
    }

    /// Generic OIDC partner; every endpoint comes from configuration.
    #[must_use]
    pub fn stebby(
        auth_url: String,
        token_url: String,
        userinfo_url: String,
        client_id: String,
        client_secret: SecretString,
        redirect_uri: String,
    ) -> Self {
        Self {
            auth_url,
            token_url,
            userinfo_url,
            client_id,
            client_secret,
            redirect_uri,
            scope: "openid email profile".to_string(),
            pkce: false,
            token_placement: TokenPlacement::Header,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: String) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_endpoints(mut self, auth_url: String, token_url: String, userinfo_url: String) -> Self {
        self.auth_url = auth_url;
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }

    fn enabled(&self) -> bool {
        !self.client_id.trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// High-entropy verifier and its S256 challenge.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn create_pkce_pair() -> anyhow::Result<PkcePair> {
    let verifier = generate_token()?;
    let challenge = pkce_challenge(&verifier);
    Ok(PkcePair {
        verifier,
        challenge,
    })
}

fn pkce_challenge(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
struct StateClaims {
    /// Provider
    p: String,
    /// Post-login path
    n: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderProfile {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Everything the HTTP layer needs to send the browser to the provider.
#[derive(Clone, Debug)]
pub struct AuthorizationStart {
    pub url: String,
    pub verifier: String,
}

#[derive(Clone, Debug)]
pub struct OAuthLogin {
    pub credentials: IssuedCredentials,
    pub next_path: String,
}

pub struct OAuthExchange<S> {
    providers: HashMap<OAuthProvider, ProviderConfig>,
    codec: Arc<TokenCodec>,
    sessions: SessionManager<S>,
    client: reqwest::Client,
}

impl<S> Clone for OAuthExchange<S> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            codec: self.codec.clone(),
            sessions: self.sessions.clone(),
            client: self.client.clone(),
        }
    }
}

impl<S: CredentialStore> OAuthExchange<S> {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(sessions: SessionManager<S>, codec: Arc<TokenCodec>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build oauth client")?;
        Ok(Self {
            providers: HashMap::new(),
            codec,
            sessions,
            client,
        })
    }

    #[must_use]
    pub fn with_provider(mut self, provider: OAuthProvider, config: ProviderConfig) -> Self {
        self.providers.insert(provider, config);
        self
    }

    /// Providers with a configured client id.
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<OAuthProvider> {
        let mut enabled: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, config)| config.enabled())
            .map(|(provider, _)| *provider)
            .collect();
        enabled.sort_by_key(|provider| provider.as_str());
        enabled
    }

    fn provider(&self, provider: OAuthProvider) -> AuthResult<&ProviderConfig> {
        self.providers
            .get(&provider)
            .filter(|config| config.enabled())
            .ok_or(AuthError::NotFound)
    }

    /// Begin a login: PKCE pair, signed state, authorize URL.
    ///
    /// # Errors
    /// `NotFound` for a disabled provider.
    pub fn start(&self, provider: OAuthProvider, next: Option<&str>) -> AuthResult<AuthorizationStart> {
        let config = self.provider(provider)?;
        let pkce = create_pkce_pair()?;
        let claims = StateClaims {
            p: provider.as_str().to_string(),
            n: sanitize_next_path(next),
        };
        let ttl = Duration::seconds(self.sessions.config().oauth_state_ttl_seconds());
        let state = self
            .codec
            .sign(&claims, ttl)
            .map_err(|err| AuthError::Internal(anyhow::Error::new(err).context("sign oauth state")))?;
        let url = build_auth_url(config, &state, Some(&pkce.challenge))?;
        Ok(AuthorizationStart {
            url,
            verifier: pkce.verifier,
        })
    }

    /// Check the state token and return the post-login path it carries.
    ///
    /// # Errors
    /// `OAuthExchangeFailed` when the state is forged, expired, or was issued
    /// for another provider.
    pub fn verify_state(&self, provider: OAuthProvider, state: &str) -> AuthResult<String> {
        let claims = self.codec.verify::<StateClaims>(state).map_err(|err| {
            debug!(provider = %provider, "oauth state rejected: {err}");
            AuthError::OAuthExchangeFailed
        })?;
        if claims.p != provider.as_str() {
            debug!(provider = %provider, "oauth state issued for another provider");
            return Err(AuthError::OAuthExchangeFailed);
        }
        Ok(sanitize_next_path(Some(&claims.n)))
    }

    /// Trade the authorization code for provider tokens.
    ///
    /// # Errors
    /// `OAuthExchangeFailed` on transport failure or any non-success status.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        verifier: Option<&str>,
    ) -> AuthResult<ProviderTokens> {
        let config = self.provider(provider)?;
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret()),
        ];
        if config.pkce {
            if let Some(verifier) = verifier {
                params.push(("code_verifier", verifier));
            }
        }

        let response = self
            .client
            .post(&config.token_url)
            .form(&params)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| exchange_failed(provider, "token exchange", &err))?;
        response
            .json::<ProviderTokens>()
            .await
            .map_err(|err| exchange_failed(provider, "token response", &err))
    }

    /// Fetch the user's email (and name, when offered).
    ///
    /// # Errors
    /// `OAuthExchangeFailed` on transport or status failure, `MissingEmail`
    /// when the provider does not disclose an address.
    pub async fn fetch_user(
        &self,
        provider: OAuthProvider,
        tokens: &ProviderTokens,
    ) -> AuthResult<ProviderProfile> {
        let config = self.provider(provider)?;
        let request = match config.token_placement {
            TokenPlacement::Header => self
                .client
                .get(&config.userinfo_url)
                .bearer_auth(&tokens.access_token),
            TokenPlacement::Query => {
                let mut url = Url::parse(&config.userinfo_url)
                    .with_context(|| format!("invalid userinfo url for {provider}"))?;
                url.query_pairs_mut()
                    .append_pair("access_token", &tokens.access_token);
                self.client.get(url)
            }
        };

        let info = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| exchange_failed(provider, "userinfo", &err))?
            .json::<UserInfo>()
            .await
            .map_err(|err| exchange_failed(provider, "userinfo response", &err))?;

        let email = info
            .email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty())
            .ok_or(AuthError::MissingEmail)?;
        Ok(ProviderProfile {
            email,
            name: info
                .name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
        })
    }

    /// Finish the callback: state, exchange, profile, then a regular session.
    ///
    /// # Errors
    /// `OAuthExchangeFailed`, `MissingEmail`, `AccessDenied`, or anything the
    /// Session Manager reports.
    pub async fn complete(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
        verifier: Option<&str>,
        device: DeviceContext,
    ) -> AuthResult<OAuthLogin> {
        self.provider(provider)?;
        let next_path = self.verify_state(provider, state)?;
        let tokens = self.exchange_code(provider, code, verifier).await?;
        let profile = self.fetch_user(provider, &tokens).await?;

        let device = device.with_label(format!("{} Login", provider.display_name()));
        let credentials = self
            .sessions
            .login_email(&profile.email, profile.name.as_deref(), device)
            .await?;
        Ok(OAuthLogin {
            credentials,
            next_path,
        })
    }
}

/// Authorize URL for `config`. PKCE parameters are only added for PKCE
/// providers.
///
/// # Errors
/// `Internal` when the configured authorize URL does not parse.
pub fn build_auth_url(
    config: &ProviderConfig,
    state: &str,
    challenge: Option<&str>,
) -> AuthResult<String> {
    let mut url = Url::parse(&config.auth_url).context("invalid oauth authorize url")?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.scope)
            .append_pair("state", state);
        if config.pkce {
            if let Some(challenge) = challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256")
                    .append_pair("access_type", "offline")
                    .append_pair("prompt", "consent");
            }
        }
    }
    Ok(url.into())
}

fn exchange_failed(provider: OAuthProvider, step: &str, err: &reqwest::Error) -> AuthError {
    warn!(provider = %provider, "oauth {step} failed: {err}");
    AuthError::OAuthExchangeFailed
}
