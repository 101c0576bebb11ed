//! In-process credential store.
//!
//! All state sits behind one async mutex, so every operation (including the
//! compare-and-set transitions) is linearizable. Used for single-instance
//! development runs and as the fixture store for tests; state is lost on
//! restart.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CredentialStore, DeviceContext, DeviceSession, ImpersonationIssue, ImpersonationToken,
    LoginCode, NewSession, OpenedSession, RefreshIssue, RefreshToken, Rotated, SessionOwner, User,
    UserId,
};
use crate::auth::{
    clock::Clock,
    utils::{generate_token, hash_token, normalize_email},
};

#[derive(Default)]
struct State {
    last_user_id: UserId,
    users: HashMap<UserId, User>,
    sessions: HashMap<Uuid, DeviceSession>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    refresh_by_hash: HashMap<Vec<u8>, Uuid>,
    login_codes: HashMap<Uuid, LoginCode>,
    impersonations: HashMap<Uuid, ImpersonationToken>,
    impersonation_by_hash: HashMap<Vec<u8>, Uuid>,
}

impl State {
    fn live_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id).filter(|user| user.deleted_at.is_none())
    }

    fn live_user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.deleted_at.is_none() && user.email == email)
    }

    fn live_session(&self, id: Uuid) -> Option<&DeviceSession> {
        self.sessions
            .get(&id)
            .filter(|session| session.revoked_at.is_none())
    }

    fn insert_user(
        &mut self,
        email: String,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> User {
        self.last_user_id += 1;
        let user = User {
            id: self.last_user_id,
            email,
            display_name,
            is_admin: false,
            trainer_unlocked: false,
            created_at: now,
            deleted_at: None,
        };
        self.users.insert(user.id, user.clone());
        user
    }

    fn insert_session(
        &mut self,
        user_id: UserId,
        device: &DeviceContext,
        impersonated_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DeviceSession {
        let session = DeviceSession {
            id: Uuid::new_v4(),
            user_id,
            device_label: device.label.clone(),
            ip: device.ip.clone(),
            user_agent: device.user_agent.clone(),
            impersonated_by,
            created_at: now,
            last_used_at: now,
            revoked_at: None,
        };
        self.sessions.insert(session.id, session.clone());
        session
    }

    fn insert_refresh(
        &mut self,
        plaintext: String,
        user_id: UserId,
        session_id: Uuid,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RefreshIssue {
        let record = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash_token(&plaintext),
            user_id,
            session_id,
            expires_at,
            revoked_at: None,
            created_at: now,
        };
        self.refresh_by_hash
            .insert(record.token_hash.clone(), record.id);
        self.refresh_tokens.insert(record.id, record.clone());
        RefreshIssue { record, plaintext }
    }

    /// Id of a usable refresh token whose session and user are still live.
    fn usable_refresh(&self, plaintext: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let id = self.refresh_by_hash.get(&hash_token(plaintext))?;
        let token = self.refresh_tokens.get(id)?;
        if !token.is_usable(now) {
            return None;
        }
        let session = self.live_session(token.session_id)?;
        self.live_user(session.user_id)?;
        Some(token.id)
    }

    fn open(
        &mut self,
        new_session: NewSession,
        plaintext: String,
        now: DateTime<Utc>,
    ) -> Option<OpenedSession> {
        let (user, user_created) = match new_session.owner {
            SessionOwner::Existing(id) => (self.live_user(id)?.clone(), false),
            SessionOwner::Enroll {
                email,
                display_name,
            } => {
                let email = normalize_email(&email);
                let existing = self.live_user_by_email(&email).cloned();
                match existing {
                    Some(user) => (user, false),
                    None => (self.insert_user(email, display_name, now), true),
                }
            }
        };
        let session = self.insert_session(
            user.id,
            &new_session.device,
            new_session.impersonated_by,
            now,
        );
        let refresh = self.insert_refresh(
            plaintext,
            user.id,
            session.id,
            now + new_session.refresh_ttl,
            now,
        );
        Some(OpenedSession {
            user,
            session,
            refresh,
            user_created,
        })
    }

    fn revoke_session(&mut self, session_id: Uuid, now: DateTime<Utc>) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.revoked_at.get_or_insert(now);
        }
        for token in self.refresh_tokens.values_mut() {
            if token.session_id == session_id {
                token.revoked_at.get_or_insert(now);
            }
        }
    }
}

pub struct MemoryCredentialStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Insert or replace a user record as-is (seeding, admin bootstrap, tests).
    pub async fn put_user(&self, mut user: User) -> User {
        user.email = normalize_email(&user.email);
        let mut state = self.state.lock().await;
        state.last_user_id = state.last_user_id.max(user.id);
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn soft_delete_user(&self, id: UserId) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        match state.users.get_mut(&id) {
            Some(user) => {
                user.deleted_at.get_or_insert(now);
                true
            }
            None => false,
        }
    }

    /// Stored refresh rows for a session, revoked ones included.
    pub async fn refresh_tokens_for_session(&self, session_id: Uuid) -> Vec<RefreshToken> {
        let state = self.state.lock().await;
        state
            .refresh_tokens
            .values()
            .filter(|token| token.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.live_user(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        Ok(state.live_user_by_email(&email).cloned())
    }

    async fn set_display_name_if_missing(&self, id: UserId, display_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&id) {
            if user.display_name.as_deref().map_or(true, str::is_empty) {
                user.display_name = Some(display_name.to_string());
            }
        }
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: UserId,
        device: &DeviceContext,
    ) -> Result<DeviceSession> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        if state.live_user(user_id).is_none() {
            anyhow::bail!("cannot create session for unknown user {user_id}");
        }
        Ok(state.insert_session(user_id, device, None, now))
    }

    async fn create_refresh(
        &self,
        user_id: UserId,
        session_id: Uuid,
        ttl: Duration,
    ) -> Result<RefreshIssue> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        match state.live_session(session_id) {
            Some(session) if session.user_id == user_id => {}
            _ => anyhow::bail!("session {session_id} is not a live session of user {user_id}"),
        }
        Ok(state.insert_refresh(plaintext, user_id, session_id, now + ttl, now))
    }

    async fn open_session(&self, new_session: NewSession) -> Result<Option<OpenedSession>> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.open(new_session, plaintext, now))
    }

    async fn validate_refresh(&self, plaintext: &str) -> Result<Option<(User, DeviceSession)>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(token_id) = state.usable_refresh(plaintext, now) else {
            return Ok(None);
        };
        let Some(session_id) = state.refresh_tokens.get(&token_id).map(|t| t.session_id) else {
            return Ok(None);
        };
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        session.last_used_at = now;
        let session = session.clone();
        Ok(state
            .live_user(session.user_id)
            .cloned()
            .map(|user| (user, session)))
    }

    async fn rotate_refresh(&self, plaintext: &str, ttl: Duration) -> Result<Option<Rotated>> {
        let successor = generate_token()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(token_id) = state.usable_refresh(plaintext, now) else {
            return Ok(None);
        };
        let Some(old) = state.refresh_tokens.get_mut(&token_id) else {
            return Ok(None);
        };
        old.revoked_at = Some(now);
        let (session_id, old_expiry) = (old.session_id, old.expires_at);

        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        session.last_used_at = now;
        let session = session.clone();
        let expires_at = if session.impersonated_by.is_some() {
            old_expiry
        } else {
            now + ttl
        };
        let Some(user) = state.live_user(session.user_id).cloned() else {
            return Ok(None);
        };
        let refresh = state.insert_refresh(successor, user.id, session.id, expires_at, now);
        Ok(Some(Rotated {
            user,
            session,
            refresh,
        }))
    }

    async fn revoke_by_plain(&self, plaintext: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(session_id) = state
            .refresh_by_hash
            .get(&hash_token(plaintext))
            .and_then(|id| state.refresh_tokens.get(id))
            .map(|token| token.session_id)
        else {
            return Ok(false);
        };
        state.revoke_session(session_id, now);
        Ok(true)
    }

    async fn revoke_by_session(&self, user_id: UserId, session_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let owned = state
            .live_session(session_id)
            .is_some_and(|session| session.user_id == user_id);
        if owned {
            state.revoke_session(session_id, now);
        }
        Ok(owned)
    }

    async fn revoke_all_sessions(&self, user_id: UserId) -> Result<u64> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let owned: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|session| session.user_id == user_id && session.revoked_at.is_none())
            .map(|session| session.id)
            .collect();
        for session_id in &owned {
            state.revoke_session(*session_id, now);
        }
        Ok(owned.len() as u64)
    }

    async fn list_sessions(&self, user_id: UserId, limit: i64) -> Result<Vec<DeviceSession>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<DeviceSession> = state
            .sessions
            .values()
            .filter(|session| session.user_id == user_id && session.revoked_at.is_none())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        sessions.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(sessions)
    }

    async fn create_login_code(
        &self,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempts: i32,
    ) -> Result<LoginCode> {
        let now = self.clock.now();
        let record = LoginCode {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            code_hash: hash_token(code),
            expires_at: now + ttl,
            consumed_at: None,
            attempts: 0,
            max_attempts,
            created_at: now,
        };
        let mut state = self.state.lock().await;
        state.login_codes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn consume_login_code(&self, challenge_id: Uuid, code: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(record) = state.login_codes.get_mut(&challenge_id) else {
            return Ok(None);
        };
        if !record.is_open(now) {
            return Ok(None);
        }
        if record.code_hash != hash_token(code) {
            record.attempts += 1;
            return Ok(None);
        }
        record.consumed_at = Some(now);
        Ok(Some(record.email.clone()))
    }

    async fn create_impersonation(
        &self,
        admin_id: UserId,
        target_id: UserId,
        ttl: Duration,
    ) -> Result<ImpersonationIssue> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let record = ImpersonationToken {
            id: Uuid::new_v4(),
            token_hash: hash_token(&plaintext),
            admin_id,
            target_id,
            expires_at: now + ttl,
            used_at: None,
            created_at: now,
        };
        let mut state = self.state.lock().await;
        state
            .impersonation_by_hash
            .insert(record.token_hash.clone(), record.id);
        state.impersonations.insert(record.id, record.clone());
        Ok(ImpersonationIssue { record, plaintext })
    }

    async fn find_impersonation(&self, plaintext: &str) -> Result<Option<ImpersonationToken>> {
        let state = self.state.lock().await;
        Ok(state
            .impersonation_by_hash
            .get(&hash_token(plaintext))
            .and_then(|id| state.impersonations.get(id))
            .cloned())
    }

    async fn redeem_impersonation(
        &self,
        token_id: Uuid,
        new_session: NewSession,
    ) -> Result<Option<OpenedSession>> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let redeemable = state
            .impersonations
            .get(&token_id)
            .is_some_and(|token| token.used_at.is_none() && now < token.expires_at);
        if !redeemable {
            return Ok(None);
        }
        let Some(opened) = state.open(new_session, plaintext, now) else {
            return Ok(None);
        };
        if let Some(token) = state.impersonations.get_mut(&token_id) {
            token.used_at = Some(now);
        }
        Ok(Some(opened))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;

    fn store() -> (Arc<ManualClock>, MemoryCredentialStore) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryCredentialStore::new(clock.clone());
        (clock, store)
    }

    fn enroll(email: &str) -> NewSession {
        NewSession {
            owner: SessionOwner::Enroll {
                email: email.to_string(),
                display_name: None,
            },
            device: DeviceContext::new("Web Browser", None, None),
            refresh_ttl: Duration::days(365),
            impersonated_by: None,
        }
    }

    #[tokio::test]
    async fn open_session_enrolls_once_per_email() -> Result<()> {
        let (_clock, store) = store();
        let first = store.open_session(enroll("User@Example.com")).await?;
        let second = store.open_session(enroll("user@example.com")).await?;
        let (Some(first), Some(second)) = (first, second) else {
            anyhow::bail!("expected sessions");
        };
        assert!(first.user_created);
        assert!(!second.user_created);
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.user.email, "user@example.com");
        assert_ne!(first.session.id, second.session.id);
        assert_eq!(store.user_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_hash_is_stored_never_plaintext() -> Result<()> {
        let (_clock, store) = store();
        let Some(opened) = store.open_session(enroll("a@example.com")).await? else {
            anyhow::bail!("expected session");
        };
        let rows = store.refresh_tokens_for_session(opened.session.id).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_hash, hash_token(&opened.refresh.plaintext));
        assert_ne!(rows[0].token_hash, opened.refresh.plaintext.as_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn create_session_never_deduplicates() -> Result<()> {
        let (_clock, store) = store();
        let Some(opened) = store.open_session(enroll("a@example.com")).await? else {
            anyhow::bail!("expected session");
        };
        let device = DeviceContext::new("Web Browser", Some("10.0.0.1".to_string()), None);
        let one = store.create_session(opened.user.id, &device).await?;
        let two = store.create_session(opened.user.id, &device).await?;
        assert_ne!(one.id, two.id);
        let issue = store
            .create_refresh(opened.user.id, two.id, Duration::days(1))
            .await?;
        assert!(store.validate_refresh(&issue.plaintext).await?.is_some());
        assert_eq!(store.list_sessions(opened.user.id, 50).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn validate_refresh_rejects_soft_deleted_user() -> Result<()> {
        let (_clock, store) = store();
        let Some(opened) = store.open_session(enroll("a@example.com")).await? else {
            anyhow::bail!("expected session");
        };
        assert!(store.validate_refresh(&opened.refresh.plaintext).await?.is_some());
        assert!(store.soft_delete_user(opened.user.id).await);
        assert!(store.validate_refresh(&opened.refresh.plaintext).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn validate_refresh_touches_last_used() -> Result<()> {
        let (clock, store) = store();
        let Some(opened) = store.open_session(enroll("a@example.com")).await? else {
            anyhow::bail!("expected session");
        };
        clock.advance(Duration::minutes(5));
        let Some((_, session)) = store.validate_refresh(&opened.refresh.plaintext).await? else {
            anyhow::bail!("expected valid token");
        };
        assert_eq!(session.last_used_at, clock.now());
        Ok(())
    }

    #[tokio::test]
    async fn revoke_by_session_is_scoped_to_owner() -> Result<()> {
        let (_clock, store) = store();
        let (Some(alice), Some(bob)) = (
            store.open_session(enroll("alice@example.com")).await?,
            store.open_session(enroll("bob@example.com")).await?,
        ) else {
            anyhow::bail!("expected sessions");
        };
        assert!(!store.revoke_by_session(alice.user.id, bob.session.id).await?);
        assert!(store.validate_refresh(&bob.refresh.plaintext).await?.is_some());
        assert!(store.revoke_by_session(bob.user.id, bob.session.id).await?);
        assert!(store.validate_refresh(&bob.refresh.plaintext).await?.is_none());
        // Revoked rows stay for audit.
        assert_eq!(store.refresh_tokens_for_session(bob.session.id).await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn login_code_locks_after_max_attempts() -> Result<()> {
        let (_clock, store) = store();
        let code = store
            .create_login_code("a@example.com", "123456", Duration::minutes(10), 2)
            .await?;
        assert!(store.consume_login_code(code.id, "000001").await?.is_none());
        assert!(store.consume_login_code(code.id, "000002").await?.is_none());
        assert!(store.consume_login_code(code.id, "123456").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn redeem_impersonation_is_single_use() -> Result<()> {
        let (_clock, store) = store();
        let Some(target) = store.open_session(enroll("t@example.com")).await? else {
            anyhow::bail!("expected session");
        };
        let issue = store
            .create_impersonation(1, target.user.id, Duration::hours(4))
            .await?;
        let new_session = NewSession {
            owner: SessionOwner::Existing(target.user.id),
            device: DeviceContext::new("Impersonation by admin", None, None),
            refresh_ttl: Duration::hours(4),
            impersonated_by: Some(1),
        };
        let first = store
            .redeem_impersonation(issue.record.id, new_session.clone())
            .await?;
        let second = store
            .redeem_impersonation(issue.record.id, new_session)
            .await?;
        assert!(first.is_some());
        assert!(second.is_none());
        let stored = store.find_impersonation(&issue.plaintext).await?;
        assert!(stored.and_then(|token| token.used_at).is_some());
        Ok(())
    }
}
