//! Session Manager: the single place where a verified identity becomes live
//! credentials, and where credentials are torn down.
//!
//! Flow Overview:
//! - `login`/`login_email` open a device session and its refresh token in one
//!   store call, then sign an access token.
//! - `refresh` rotates the refresh token (compare-and-set in the store) and
//!   signs a new access token for the same user.
//! - `logout` revokes exactly the session behind the presented credential.
//!
//! Failures reaching callers are collapsed to `Unauthenticated`; the reason a
//! token did not validate is never reported.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    credential::{resolve_active_credential, ActiveCredential, CredentialJar, CredentialKind},
    error::{AuthError, AuthResult},
    policy::EnrollmentPolicy,
    store::{
        CredentialStore, DeviceContext, DeviceSession, NewSession, OpenedSession, SessionOwner,
        User, UserId,
    },
    token::{AccessClaims, TokenCodec},
    utils::{normalize_email, valid_email},
};

/// Credentials handed to the client after login or refresh.
#[derive(Clone, Debug)]
pub struct IssuedCredentials {
    pub user: User,
    pub session: DeviceSession,
    /// Plaintext refresh token; this is the only copy.
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub access_token: String,
    pub access_expires_in: i64,
    pub kind: CredentialKind,
}

/// Who is behind the active credential.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: User,
    pub session: DeviceSession,
    pub kind: CredentialKind,
}

pub struct SessionManager<S> {
    store: Arc<S>,
    codec: Arc<TokenCodec>,
    policy: Arc<dyn EnrollmentPolicy>,
    config: AuthConfig,
}

impl<S> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            codec: self.codec.clone(),
            policy: self.policy.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: CredentialStore> SessionManager<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        codec: Arc<TokenCodec>,
        policy: Arc<dyn EnrollmentPolicy>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            codec,
            policy,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Open a regular session for an existing user.
    ///
    /// # Errors
    /// `NotFound` when the user does not exist (or is soft-deleted).
    pub async fn login(&self, user_id: UserId, device: DeviceContext) -> AuthResult<IssuedCredentials> {
        let new_session = NewSession {
            owner: SessionOwner::Existing(user_id),
            device,
            refresh_ttl: Duration::seconds(self.config.refresh_ttl_seconds()),
            impersonated_by: None,
        };
        let opened = self
            .store
            .open_session(new_session)
            .await?
            .ok_or(AuthError::NotFound)?;
        self.finish(opened, CredentialKind::Regular).await
    }

    /// Log in with a verified email address, creating the user on first login.
    ///
    /// `display_name` fills an empty profile name; it never overwrites one.
    ///
    /// # Errors
    /// `AccessDenied` when the enrollment policy refuses a new account.
    pub async fn login_email(
        &self,
        email: &str,
        display_name: Option<&str>,
        device: DeviceContext,
    ) -> AuthResult<IssuedCredentials> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let owner = match self.store.find_user_by_email(&email).await? {
            Some(user) => {
                if let Some(name) = display_name {
                    self.store.set_display_name_if_missing(user.id, name).await?;
                }
                SessionOwner::Existing(user.id)
            }
            None => {
                if !self.policy.may_enroll(&email) {
                    info!("enrollment refused by policy");
                    return Err(AuthError::AccessDenied);
                }
                SessionOwner::Enroll {
                    email,
                    display_name: display_name.map(str::to_string),
                }
            }
        };

        let new_session = NewSession {
            owner,
            device,
            refresh_ttl: Duration::seconds(self.config.refresh_ttl_seconds()),
            impersonated_by: None,
        };
        // A user deleted between lookup and insert surfaces as not authenticated.
        let opened = self
            .store
            .open_session(new_session)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if opened.user_created {
            info!(user_id = opened.user.id, "enrolled new user");
        }
        self.finish(opened, CredentialKind::Regular).await
    }

    /// Sign the access token for a freshly opened session.
    ///
    /// If signing fails the new refresh token is revoked before the error is
    /// returned, so nothing usable is left behind.
    pub(crate) async fn finish(
        &self,
        opened: OpenedSession,
        kind: CredentialKind,
    ) -> AuthResult<IssuedCredentials> {
        let access_token = match self.mint_access(&opened.user) {
            Ok(token) => token,
            Err(err) => {
                if let Err(revoke_err) = self.store.revoke_by_plain(&opened.refresh.plaintext).await {
                    warn!("failed to revoke session after signing error: {revoke_err}");
                }
                return Err(err);
            }
        };
        info!(
            user_id = opened.user.id,
            session_id = %opened.session.id,
            "session opened"
        );
        Ok(IssuedCredentials {
            refresh_expires_at: opened.refresh.record.expires_at,
            refresh_token: opened.refresh.plaintext,
            user: opened.user,
            session: opened.session,
            access_token,
            access_expires_in: self.config.access_ttl_seconds(),
            kind,
        })
    }

    /// Rotate the presented refresh credential and mint a new access token.
    ///
    /// # Errors
    /// `Unauthenticated` for any invalid, expired, revoked, or already-rotated
    /// credential.
    pub async fn refresh(&self, credential: &ActiveCredential) -> AuthResult<IssuedCredentials> {
        let rotated = self
            .store
            .rotate_refresh(
                &credential.plaintext,
                Duration::seconds(self.config.refresh_ttl_seconds()),
            )
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        let access_token = self.mint_access(&rotated.user)?;
        debug!(session_id = %rotated.session.id, "refresh token rotated");
        Ok(IssuedCredentials {
            refresh_expires_at: rotated.refresh.record.expires_at,
            refresh_token: rotated.refresh.plaintext,
            user: rotated.user,
            session: rotated.session,
            access_token,
            access_expires_in: self.config.access_ttl_seconds(),
            kind: credential.kind,
        })
    }

    /// Revoke the session behind the presented credential only.
    ///
    /// Returns the channel the client should clear. Unknown credentials are
    /// not an error; logging out is idempotent.
    pub async fn logout(&self, credential: &ActiveCredential) -> AuthResult<CredentialKind> {
        if self.store.revoke_by_plain(&credential.plaintext).await? {
            debug!(kind = ?credential.kind, "session revoked on logout");
        }
        Ok(credential.kind)
    }

    /// Resolve a refresh credential to its user and session.
    ///
    /// # Errors
    /// `Unauthenticated` if the credential does not validate.
    pub async fn authenticate(&self, credential: &ActiveCredential) -> AuthResult<Principal> {
        let (user, session) = self
            .store
            .validate_refresh(&credential.plaintext)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        Ok(Principal {
            user,
            session,
            kind: credential.kind,
        })
    }

    /// Who is logged in, preferring the impersonation credential.
    ///
    /// # Errors
    /// `Unauthenticated` when the jar is empty or the active credential is dead.
    pub async fn me(&self, jar: &CredentialJar) -> AuthResult<Principal> {
        let credential = resolve_active_credential(jar).ok_or(AuthError::Unauthenticated)?;
        self.authenticate(&credential).await
    }

    /// Verify a bearer access token.
    ///
    /// # Errors
    /// `Unauthenticated` on any signature, expiry, or format failure.
    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        self.codec.verify::<AccessClaims>(token).map_err(|err| {
            debug!("access token rejected: {err}");
            AuthError::Unauthenticated
        })
    }

    /// Verify a bearer token and load its (still live) user.
    ///
    /// # Errors
    /// `Unauthenticated` if the token is invalid or the user is gone.
    pub async fn bearer_user(&self, token: &str) -> AuthResult<User> {
        let claims = self.verify_access(token)?;
        let user_id: UserId = claims.sub.parse().map_err(|_| AuthError::Unauthenticated)?;
        self.store
            .find_user(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// # Errors
    /// Storage failures only.
    pub async fn list_sessions(&self, user_id: UserId) -> AuthResult<Vec<DeviceSession>> {
        Ok(self
            .store
            .list_sessions(user_id, self.config.session_list_limit())
            .await?)
    }

    /// # Errors
    /// `NotFound` when the session does not exist or belongs to someone else.
    pub async fn revoke_session(&self, user_id: UserId, session_id: Uuid) -> AuthResult<()> {
        if self.store.revoke_by_session(user_id, session_id).await? {
            info!(user_id, session_id = %session_id, "session revoked");
            Ok(())
        } else {
            Err(AuthError::NotFound)
        }
    }

    /// # Errors
    /// Storage failures only.
    pub async fn revoke_all_sessions(&self, user_id: UserId) -> AuthResult<u64> {
        let revoked = self.store.revoke_all_sessions(user_id).await?;
        info!(user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    fn mint_access(&self, user: &User) -> AuthResult<String> {
        let claims = AccessClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
        };
        self.codec
            .sign(&claims, Duration::seconds(self.config.access_ttl_seconds()))
            .map_err(|err| AuthError::Internal(anyhow::Error::new(err).context("sign access token")))
    }
}
