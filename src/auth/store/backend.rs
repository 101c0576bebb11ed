//! Runtime choice of credential store.
//!
//! PostgreSQL when a DSN is configured; otherwise the in-memory store for
//! single-instance development.

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    CredentialStore, DeviceContext, DeviceSession, ImpersonationIssue, ImpersonationToken,
    LoginCode, MemoryCredentialStore, NewSession, OpenedSession, PgCredentialStore, RefreshIssue,
    Rotated, User, UserId,
};

#[derive(Clone)]
pub enum Backend {
    Memory(Arc<MemoryCredentialStore>),
    Postgres(PgCredentialStore),
}

impl Backend {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Postgres(_) => "postgresql",
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Backend::Memory($store) => $call.await,
            Backend::Postgres($store) => $call.await,
        }
    };
}

impl CredentialStore for Backend {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        dispatch!(self, store => store.find_user(id))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        dispatch!(self, store => store.find_user_by_email(email))
    }

    async fn set_display_name_if_missing(&self, id: UserId, display_name: &str) -> Result<()> {
        dispatch!(self, store => store.set_display_name_if_missing(id, display_name))
    }

    async fn create_session(
        &self,
        user_id: UserId,
        device: &DeviceContext,
    ) -> Result<DeviceSession> {
        dispatch!(self, store => store.create_session(user_id, device))
    }

    async fn create_refresh(
        &self,
        user_id: UserId,
        session_id: Uuid,
        ttl: Duration,
    ) -> Result<RefreshIssue> {
        dispatch!(self, store => store.create_refresh(user_id, session_id, ttl))
    }

    async fn open_session(&self, new_session: NewSession) -> Result<Option<OpenedSession>> {
        dispatch!(self, store => store.open_session(new_session))
    }

    async fn validate_refresh(&self, plaintext: &str) -> Result<Option<(User, DeviceSession)>> {
        dispatch!(self, store => store.validate_refresh(plaintext))
    }

    async fn rotate_refresh(&self, plaintext: &str, ttl: Duration) -> Result<Option<Rotated>> {
        dispatch!(self, store => store.rotate_refresh(plaintext, ttl))
    }

    async fn revoke_by_plain(&self, plaintext: &str) -> Result<bool> {
        dispatch!(self, store => store.revoke_by_plain(plaintext))
    }

    async fn revoke_by_session(&self, user_id: UserId, session_id: Uuid) -> Result<bool> {
        dispatch!(self, store => store.revoke_by_session(user_id, session_id))
    }

    async fn revoke_all_sessions(&self, user_id: UserId) -> Result<u64> {
        dispatch!(self, store => store.revoke_all_sessions(user_id))
    }

    async fn list_sessions(&self, user_id: UserId, limit: i64) -> Result<Vec<DeviceSession>> {
        dispatch!(self, store => store.list_sessions(user_id, limit))
    }

    async fn create_login_code(
        &self,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempts: i32,
    ) -> Result<LoginCode> {
        dispatch!(self, store => store.create_login_code(email, code, ttl, max_attempts))
    }

    async fn consume_login_code(&self, challenge_id: Uuid, code: &str) -> Result<Option<String>> {
        dispatch!(self, store => store.consume_login_code(challenge_id, code))
    }

    async fn create_impersonation(
        &self,
        admin_id: UserId,
        target_id: UserId,
        ttl: Duration,
    ) -> Result<ImpersonationIssue> {
        dispatch!(self, store => store.create_impersonation(admin_id, target_id, ttl))
    }

    async fn find_impersonation(&self, plaintext: &str) -> Result<Option<ImpersonationToken>> {
        dispatch!(self, store => store.find_impersonation(plaintext))
    }

    async fn redeem_impersonation(
        &self,
        token_id: Uuid,
        new_session: NewSession,
    ) -> Result<Option<OpenedSession>> {
        dispatch!(self, store => store.redeem_impersonation(token_id, new_session))
    }
}
