//! Impersonation Manager: admins acting as a non-admin user.
//!
//! Flow Overview:
//! 1) An admin calls `issue` for a target user. The target must exist and must
//!    not be an admin. One single-use token (hashed at rest) is stored and
//!    returned as a link.
//! 2) Whoever opens the link calls `consume`. The store marks the token used
//!    and opens a session for the target in the same step. The session is
//!    labelled with the admin, records `impersonated_by`, and lives for the
//!    impersonation TTL only; rotation never extends it.
//! 3) The resulting refresh token travels on its own channel, so logging out
//!    of the impersonation leaves the admin's own session alone.
//!
//! Precise failures (`InvalidToken`, `Expired`, `AlreadyUsed`) are reported
//! to admins only; `consume_for` collapses them for everybody else.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    clock::Clock,
    credential::{CredentialJar, CredentialKind},
    error::{AuthError, AuthResult, ImpersonationError},
    session::{IssuedCredentials, SessionManager},
    store::{CredentialStore, DeviceContext, NewSession, SessionOwner, User, UserId},
};

type ImpersonationResult<T> = Result<T, ImpersonationError>;

#[derive(Clone, Debug)]
pub struct ImpersonationGrant {
    /// Plaintext token; only ever shown to the issuing admin.
    pub token: String,
    /// Frontend link that consumes the token.
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub target: User,
}

pub struct ImpersonationManager<S> {
    store: Arc<S>,
    sessions: SessionManager<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for ImpersonationManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: CredentialStore> ImpersonationManager<S> {
    #[must_use]
    pub fn new(sessions: SessionManager<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: sessions.store().clone(),
            sessions,
            clock,
        }
    }

    /// Issue a single-use impersonation link for `target_id`.
    ///
    /// # Errors
    /// `Forbidden` when `admin` is not an admin or the target is one,
    /// `NotFound` when the target does not exist.
    pub async fn issue(&self, admin: &User, target_id: UserId) -> ImpersonationResult<ImpersonationGrant> {
        if !admin.is_admin {
            return Err(ImpersonationError::Forbidden);
        }
        let target = self
            .store
            .find_user(target_id)
            .await?
            .ok_or(ImpersonationError::NotFound)?;
        if target.is_admin {
            warn!(admin_id = admin.id, target_id, "refused to impersonate an admin");
            return Err(ImpersonationError::Forbidden);
        }

        let ttl = Duration::seconds(self.sessions.config().impersonation_ttl_seconds());
        let issue = self.store.create_impersonation(admin.id, target.id, ttl).await?;
        info!(admin_id = admin.id, target_id, "impersonation token issued");

        let url = format!(
            "{}/auth/impersonate?token={}",
            self.sessions.config().frontend_base_url(),
            issue.plaintext
        );
        Ok(ImpersonationGrant {
            token: issue.plaintext,
            url,
            expires_at: issue.record.expires_at,
            target,
        })
    }

    /// Redeem an impersonation token for a session as its target user.
    ///
    /// # Errors
    /// `InvalidToken`, `Expired`, `AlreadyUsed`, `Forbidden` (target became an
    /// admin, or the issuer lost admin rights), `NotFound` (target gone).
    pub async fn consume(&self, token: &str, device: DeviceContext) -> ImpersonationResult<IssuedCredentials> {
        let record = self
            .store
            .find_impersonation(token.trim())
            .await?
            .ok_or(ImpersonationError::InvalidToken)?;
        if record.used_at.is_some() {
            return Err(ImpersonationError::AlreadyUsed);
        }
        if self.clock.now() >= record.expires_at {
            return Err(ImpersonationError::Expired);
        }

        let target = self
            .store
            .find_user(record.target_id)
            .await?
            .ok_or(ImpersonationError::NotFound)?;
        if target.is_admin {
            return Err(ImpersonationError::Forbidden);
        }
        let admin = match self.store.find_user(record.admin_id).await? {
            Some(admin) if admin.is_admin => admin,
            _ => return Err(ImpersonationError::Forbidden),
        };

        let admin_name = admin.display_name.as_deref().unwrap_or(&admin.email);
        let new_session = NewSession {
            owner: SessionOwner::Existing(target.id),
            device: device.with_label(format!("Impersonation by {admin_name}")),
            refresh_ttl: Duration::seconds(self.sessions.config().impersonation_ttl_seconds()),
            impersonated_by: Some(admin.id),
        };

        let Some(opened) = self.store.redeem_impersonation(record.id, new_session).await? else {
            return Err(self.classify_lost_race(token.trim()).await);
        };
        info!(
            admin_id = admin.id,
            target_id = target.id,
            session_id = %opened.session.id,
            "impersonation session opened"
        );
        self.sessions
            .finish(opened, CredentialKind::Impersonation)
            .await
            .map_err(|err| match err {
                AuthError::Internal(err) => ImpersonationError::Internal(err),
                other => ImpersonationError::Internal(anyhow::Error::new(other)),
            })
    }

    /// Redeem on behalf of an HTTP caller, reporting precise reasons only when
    /// the caller's own (regular) credential belongs to an admin.
    ///
    /// # Errors
    /// See [`ImpersonationManager::consume`] and [`ImpersonationError::for_caller`].
    pub async fn consume_for(
        &self,
        caller: &CredentialJar,
        token: &str,
        device: DeviceContext,
    ) -> AuthResult<IssuedCredentials> {
        match self.consume(token, device).await {
            Ok(issued) => Ok(issued),
            Err(ImpersonationError::Internal(err)) => Err(AuthError::Internal(err)),
            Err(err) => {
                let caller_is_admin = self.caller_is_admin(caller).await?;
                Err(err.for_caller(caller_is_admin))
            }
        }
    }

    /// Whether the caller's regular credential belongs to a live admin.
    ///
    /// # Errors
    /// Storage failures only.
    pub async fn caller_is_admin(&self, caller: &CredentialJar) -> AuthResult<bool> {
        let Some(credential) = caller.regular_credential() else {
            return Ok(false);
        };
        match self.sessions.authenticate(&credential).await {
            Ok(principal) => Ok(principal.user.is_admin && principal.session.impersonated_by.is_none()),
            Err(AuthError::Unauthenticated) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Another redemption won between our checks and the store's CAS.
    async fn classify_lost_race(&self, token: &str) -> ImpersonationError {
        match self.store.find_impersonation(token).await {
            Ok(Some(record)) if record.used_at.is_some() => ImpersonationError::AlreadyUsed,
            Ok(Some(record)) if self.clock.now() >= record.expires_at => ImpersonationError::Expired,
            Ok(Some(_)) => ImpersonationError::NotFound,
            Ok(None) => ImpersonationError::InvalidToken,
            Err(err) => ImpersonationError::Internal(err),
        }
    }
}
