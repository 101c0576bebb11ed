//! Credential Store: users, device sessions, refresh tokens, login codes, and
//! impersonation grants.
//!
//! Flow Overview:
//! - Plaintext tokens and codes only cross this boundary on the way in; records
//!   keep the SHA-256 hash.
//! - Every single-use transition (refresh rotation, login code consumption,
//!   impersonation redemption) is a compare-and-set inside the store. Callers
//!   never read, decide, then write.
//! - Revocation marks rows; nothing that might be audited is deleted.
//! - Soft-deleted users never match a lookup, so their credentials stop
//!   validating without being touched.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use uuid::Uuid;

pub mod backend;
pub mod memory;
pub mod postgres;

pub use backend::Backend;
pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

pub type UserId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub trainer_unlocked: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One logical client (browser/device) of a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSession {
    pub id: Uuid,
    pub user_id: UserId,
    pub device_label: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// Admin who opened this session through impersonation.
    pub impersonated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: Vec<u8>,
    pub user_id: UserId,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// A freshly issued refresh token. `plaintext` is the only copy of the raw value.
#[derive(Clone, Debug)]
pub struct RefreshIssue {
    pub record: RefreshToken,
    pub plaintext: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginCode {
    /// Challenge id handed to the client.
    pub id: Uuid,
    pub email: String,
    pub code_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl LoginCode {
    #[must_use]
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.consumed_at.is_none() && now < self.expires_at && self.attempts < self.max_attempts
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImpersonationToken {
    pub id: Uuid,
    pub token_hash: Vec<u8>,
    pub admin_id: UserId,
    pub target_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ImpersonationIssue {
    pub record: ImpersonationToken,
    pub plaintext: String,
}

/// Where a login came from, as recorded on the device session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceContext {
    pub label: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl DeviceContext {
    #[must_use]
    pub fn new(label: impl Into<String>, ip: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            label: label.into(),
            ip,
            user_agent,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Who the new session belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOwner {
    Existing(UserId),
    /// Find the user by (normalized) email, creating it if absent.
    Enroll {
        email: String,
        display_name: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub owner: SessionOwner,
    pub device: DeviceContext,
    pub refresh_ttl: Duration,
    pub impersonated_by: Option<UserId>,
}

/// Everything created by one login: user (possibly new), session, refresh token.
#[derive(Clone, Debug)]
pub struct OpenedSession {
    pub user: User,
    pub session: DeviceSession,
    pub refresh: RefreshIssue,
    pub user_created: bool,
}

/// Result of a successful rotation.
#[derive(Clone, Debug)]
pub struct Rotated {
    pub user: User,
    pub session: DeviceSession,
    pub refresh: RefreshIssue,
}

/// Storage seam for the credential core.
///
/// Implementations must make `rotate_refresh`, `consume_login_code` and
/// `redeem_impersonation` linearizable: of any number of concurrent calls on
/// the same artifact, at most one observes success.
pub trait CredentialStore: Send + Sync {
    fn find_user(&self, id: UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    fn find_user_by_email(&self, email: &str)
        -> impl Future<Output = Result<Option<User>>> + Send;

    fn set_display_name_if_missing(
        &self,
        id: UserId,
        display_name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Never deduplicates: each call is a new device presence.
    fn create_session(
        &self,
        user_id: UserId,
        device: &DeviceContext,
    ) -> impl Future<Output = Result<DeviceSession>> + Send;

    fn create_refresh(
        &self,
        user_id: UserId,
        session_id: Uuid,
        ttl: Duration,
    ) -> impl Future<Output = Result<RefreshIssue>> + Send;

    /// Create (optionally) the user, the session and its refresh token as one
    /// unit. Returns `None` when an `Existing` owner is unknown or deleted.
    fn open_session(
        &self,
        new_session: NewSession,
    ) -> impl Future<Output = Result<Option<OpenedSession>>> + Send;

    /// `None` on miss, expiry, revocation, revoked session or deleted user.
    /// Touches the session's `last_used_at` on success.
    fn validate_refresh(
        &self,
        plaintext: &str,
    ) -> impl Future<Output = Result<Option<(User, DeviceSession)>>> + Send;

    /// Revoke the presented token and issue its successor on the same session.
    ///
    /// Impersonation sessions keep their original expiry; regular sessions get
    /// `ttl` from now.
    fn rotate_refresh(
        &self,
        plaintext: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<Option<Rotated>>> + Send;

    /// Revokes the token and the session it belongs to.
    fn revoke_by_plain(&self, plaintext: &str) -> impl Future<Output = Result<bool>> + Send;

    fn revoke_by_session(
        &self,
        user_id: UserId,
        session_id: Uuid,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn revoke_all_sessions(&self, user_id: UserId) -> impl Future<Output = Result<u64>> + Send;

    /// Live sessions owned by `user_id`, most recently used first.
    fn list_sessions(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<DeviceSession>>> + Send;

    fn create_login_code(
        &self,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempts: i32,
    ) -> impl Future<Output = Result<LoginCode>> + Send;

    /// Mark the code consumed and return its email, or count a failed attempt.
    fn consume_login_code(
        &self,
        challenge_id: Uuid,
        code: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    fn create_impersonation(
        &self,
        admin_id: UserId,
        target_id: UserId,
        ttl: Duration,
    ) -> impl Future<Output = Result<ImpersonationIssue>> + Send;

    fn find_impersonation(
        &self,
        plaintext: &str,
    ) -> impl Future<Output = Result<Option<ImpersonationToken>>> + Send;

    /// Set `used_at` and open the target's session atomically. `None` when the
    /// token was already used, expired, or the target no longer exists.
    fn redeem_impersonation(
        &self,
        token_id: Uuid,
        new_session: NewSession,
    ) -> impl Future<Output = Result<Option<OpenedSession>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_code_closes_on_consume_expiry_or_attempts() {
        let now = Utc::now();
        let mut code = LoginCode {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            code_hash: Vec::new(),
            expires_at: now + Duration::seconds(600),
            consumed_at: None,
            attempts: 0,
            max_attempts: 5,
            created_at: now,
        };
        assert!(code.is_open(now));
        assert!(!code.is_open(now + Duration::seconds(600)));

        code.attempts = 5;
        assert!(!code.is_open(now));

        code.attempts = 0;
        code.consumed_at = Some(now);
        assert!(!code.is_open(now));
    }

    #[test]
    fn refresh_token_unusable_when_revoked_or_expired() {
        let now = Utc::now();
        let mut token = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: Vec::new(),
            user_id: 1,
            session_id: Uuid::new_v4(),
            expires_at: now + Duration::seconds(10),
            revoked_at: None,
            created_at: now,
        };
        assert!(token.is_usable(now));
        assert!(!token.is_usable(now + Duration::seconds(10)));
        token.revoked_at = Some(now);
        assert!(!token.is_usable(now));
    }
}
