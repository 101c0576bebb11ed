//! PostgreSQL credential store (`sql/schema.sql`).
//!
//! Single-use transitions are conditional `UPDATE ... WHERE <still unused>`
//! statements. The row lock taken by the first writer makes a concurrent
//! second writer re-evaluate the predicate and match nothing, so only one
//! caller ever sees a row come back.
//!
//! Timestamps are bound from the injected clock rather than `NOW()`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, PgConnection, PgPool, Row};
use std::sync::Arc;
use tracing::{Instrument, Span};
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

const USER_COLUMNS: &str =
    "id, email, display_name, is_admin, trainer_unlocked, created_at, deleted_at";
const SESSION_COLUMNS: &str = "id, user_id, device_label, ip, user_agent, impersonated_by, \
     created_at, last_used_at, revoked_at";
const REFRESH_COLUMNS: &str =
    "id, token_hash, user_id, session_id, expires_at, revoked_at, created_at";
const IMPERSONATION_COLUMNS: &str =
    "id, token_hash, admin_id, target_id, expires_at, used_at, created_at";

fn db_span(operation: &str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        is_admin: row.get("is_admin"),
        trainer_unlocked: row.get("trainer_unlocked"),
        created_at: row.get("created_at"),
        deleted_at: row.get("deleted_at"),
    }
}

fn session_from_row(row: &PgRow) -> DeviceSession {
    DeviceSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        device_label: row.get("device_label"),
        ip: row.get("ip"),
        user_agent: row.get("user_agent"),
        impersonated_by: row.get("impersonated_by"),
        created_at: row.get("created_at"),
        last_used_at: row.get("last_used_at"),
        revoked_at: row.get("revoked_at"),
    }
}

fn refresh_from_row(row: &PgRow) -> RefreshToken {
    RefreshToken {
        id: row.get("id"),
        token_hash: row.get("token_hash"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    }
}

fn impersonation_from_row(row: &PgRow) -> ImpersonationToken {
    ImpersonationToken {
        id: row.get("id"),
        token_hash: row.get("token_hash"),
        admin_id: row.get("admin_id"),
        target_id: row.get("target_id"),
        expires_at: row.get("expires_at"),
        used_at: row.get("used_at"),
        created_at: row.get("created_at"),
    }
}

async fn select_live_user(conn: &mut PgConnection, id: UserId) -> Result<Option<User>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .instrument(db_span("SELECT", &query))
        .await
        .context("failed to lookup user")?;
    Ok(row.as_ref().map(user_from_row))
}

async fn select_live_user_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>> {
    let query = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = $1 AND deleted_at IS NULL"
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(&mut *conn)
        .instrument(db_span("SELECT", &query))
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Find the live user for `email`, inserting it when absent. Concurrent
/// enrollments of the same address converge on one row.
async fn enroll_user(
    conn: &mut PgConnection,
    email: &str,
    display_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(User, bool)> {
    if let Some(user) = select_live_user_by_email(conn, email).await? {
        return Ok((user, false));
    }
    let query = format!(
        r"
        INSERT INTO users (email, display_name, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (lower(email)) WHERE deleted_at IS NULL DO NOTHING
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(display_name)
        .bind(now)
        .fetch_optional(&mut *conn)
        .instrument(db_span("INSERT", &query))
        .await
        .context("failed to insert user")?;
    if let Some(row) = row {
        return Ok((user_from_row(&row), true));
    }
    select_live_user_by_email(conn, email)
        .await?
        .map(|user| (user, false))
        .context("enrolled user vanished")
}

async fn insert_session(
    conn: &mut PgConnection,
    user_id: UserId,
    device: &DeviceContext,
    impersonated_by: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<DeviceSession> {
    let query = format!(
        r"
        INSERT INTO device_sessions
            (id, user_id, device_label, ip, user_agent, impersonated_by, created_at, last_used_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING {SESSION_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&device.label)
        .bind(device.ip.as_deref())
        .bind(device.user_agent.as_deref())
        .bind(impersonated_by)
        .bind(now)
        .fetch_one(&mut *conn)
        .instrument(db_span("INSERT", &query))
        .await
        .context("failed to insert device session")?;
    Ok(session_from_row(&row))
}

async fn insert_refresh(
    conn: &mut PgConnection,
    plaintext: String,
    user_id: UserId,
    session_id: Uuid,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<RefreshIssue> {
    let query = format!(
        r"
        INSERT INTO refresh_tokens (id, token_hash, user_id, session_id, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {REFRESH_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(hash_token(&plaintext))
        .bind(user_id)
        .bind(session_id)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *conn)
        .instrument(db_span("INSERT", &query))
        .await
        .context("failed to insert refresh token")?;
    Ok(RefreshIssue {
        record: refresh_from_row(&row),
        plaintext,
    })
}

async fn open_in(
    conn: &mut PgConnection,
    new_session: NewSession,
    plaintext: String,
    now: DateTime<Utc>,
) -> Result<Option<OpenedSession>> {
    let (user, user_created) = match &new_session.owner {
        SessionOwner::Existing(id) => match select_live_user(conn, *id).await? {
            Some(user) => (user, false),
            None => return Ok(None),
        },
        SessionOwner::Enroll {
            email,
            display_name,
        } => enroll_user(conn, &normalize_email(email), display_name.as_deref(), now).await?,
    };
    let session = insert_session(
        conn,
        user.id,
        &new_session.device,
        new_session.impersonated_by,
        now,
    )
    .await?;
    let refresh = insert_refresh(
        conn,
        plaintext,
        user.id,
        session.id,
        now + new_session.refresh_ttl,
        now,
    )
    .await?;
    Ok(Some(OpenedSession {
        user,
        session,
        refresh,
        user_created,
    }))
}

async fn revoke_session_rows(
    conn: &mut PgConnection,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    let query = "UPDATE device_sessions SET revoked_at = COALESCE(revoked_at, $2) WHERE id = $1";
    sqlx::query(query)
        .bind(session_id)
        .bind(now)
        .execute(&mut *conn)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke device session")?;

    let query = r"
        UPDATE refresh_tokens SET revoked_at = $2
        WHERE session_id = $1 AND revoked_at IS NULL
    ";
    sqlx::query(query)
        .bind(session_id)
        .bind(now)
        .execute(&mut *conn)
        .instrument(db_span("UPDATE", query))
        .await
        .context("failed to revoke session refresh tokens")?;
    Ok(())
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CredentialStore for PgCredentialStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        select_live_user(&mut conn, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        select_live_user_by_email(&mut conn, &normalize_email(email)).await
    }

    async fn set_display_name_if_missing(&self, id: UserId, display_name: &str) -> Result<()> {
        let query = r"
            UPDATE users SET display_name = $2
            WHERE id = $1 AND (display_name IS NULL OR display_name = '')
        ";
        sqlx::query(query)
            .bind(id)
            .bind(display_name)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to set display name")?;
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: UserId,
        device: &DeviceContext,
    ) -> Result<DeviceSession> {
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        insert_session(&mut conn, user_id, device, None, now).await
    }

    async fn create_refresh(
        &self,
        user_id: UserId,
        session_id: Uuid,
        ttl: Duration,
    ) -> Result<RefreshIssue> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        insert_refresh(&mut conn, plaintext, user_id, session_id, now + ttl, now).await
    }

    async fn open_session(&self, new_session: NewSession) -> Result<Option<OpenedSession>> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.context("begin login transaction")?;
        let Some(opened) = open_in(&mut tx, new_session, plaintext, now).await? else {
            return Ok(None);
        };
        tx.commit().await.context("commit login transaction")?;
        Ok(Some(opened))
    }

    async fn validate_refresh(&self, plaintext: &str) -> Result<Option<(User, DeviceSession)>> {
        let now = self.clock.now();
        let mut conn = self.pool.acquire().await.context("acquire connection")?;
        let query = format!(
            r"
            UPDATE device_sessions SET last_used_at = $2
            WHERE revoked_at IS NULL
              AND id = (
                SELECT session_id FROM refresh_tokens
                WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
              )
              AND user_id IN (SELECT id FROM users WHERE deleted_at IS NULL)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(hash_token(plaintext))
            .bind(now)
            .fetch_optional(&mut *conn)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to validate refresh token")?;
        let Some(session) = row.as_ref().map(session_from_row) else {
            return Ok(None);
        };
        Ok(select_live_user(&mut conn, session.user_id)
            .await?
            .map(|user| (user, session)))
    }

    async fn rotate_refresh(&self, plaintext: &str, ttl: Duration) -> Result<Option<Rotated>> {
        let successor = generate_token()?;
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.context("begin rotate transaction")?;

        // Compare-and-set: only one caller gets the row back.
        let query = r"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2
            RETURNING session_id, expires_at
        ";
        let row = sqlx::query(query)
            .bind(hash_token(plaintext))
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh token")?;
        let Some(row) = row else {
            return Ok(None);
        };
        let session_id: Uuid = row.get("session_id");
        let old_expiry: DateTime<Utc> = row.get("expires_at");

        let query = format!(
            r"
            UPDATE device_sessions SET last_used_at = $2
            WHERE id = $1 AND revoked_at IS NULL
            RETURNING {SESSION_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to touch device session")?;
        let Some(session) = row.as_ref().map(session_from_row) else {
            return Ok(None);
        };
        let Some(user) = select_live_user(&mut tx, session.user_id).await? else {
            return Ok(None);
        };

        let expires_at = if session.impersonated_by.is_some() {
            old_expiry
        } else {
            now + ttl
        };
        let refresh = insert_refresh(&mut tx, successor, user.id, session.id, expires_at, now).await?;
        tx.commit().await.context("commit rotate transaction")?;

        Ok(Some(Rotated {
            user,
            session,
            refresh,
        }))
    }

    async fn revoke_by_plain(&self, plaintext: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.context("begin revoke transaction")?;
        let query = "SELECT session_id FROM refresh_tokens WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(hash_token(plaintext))
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;
        let Some(row) = row else {
            return Ok(false);
        };
        revoke_session_rows(&mut tx, row.get("session_id"), now).await?;
        tx.commit().await.context("commit revoke transaction")?;
        Ok(true)
    }

    async fn revoke_by_session(&self, user_id: UserId, session_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.context("begin revoke transaction")?;
        let query = r"
            SELECT id FROM device_sessions
            WHERE id = $1 AND user_id = $2 AND revoked_at IS NULL
            FOR UPDATE
        ";
        let row = sqlx::query(query)
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup device session")?;
        if row.is_none() {
            return Ok(false);
        }
        revoke_session_rows(&mut tx, session_id, now).await?;
        tx.commit().await.context("commit revoke transaction")?;
        Ok(true)
    }

    async fn revoke_all_sessions(&self, user_id: UserId) -> Result<u64> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.context("begin revoke transaction")?;
        let query = r"
            UPDATE device_sessions SET revoked_at = $2
            WHERE user_id = $1 AND revoked_at IS NULL
        ";
        let revoked = sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke device sessions")?
            .rows_affected();

        let query = r"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE user_id = $1 AND revoked_at IS NULL
        ";
        sqlx::query(query)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to revoke refresh tokens")?;
        tx.commit().await.context("commit revoke transaction")?;
        Ok(revoked)
    }

    async fn list_sessions(&self, user_id: UserId, limit: i64) -> Result<Vec<DeviceSession>> {
        let query = format!(
            r"
            SELECT {SESSION_COLUMNS} FROM device_sessions
            WHERE user_id = $1 AND revoked_at IS NULL
            ORDER BY last_used_at DESC
            LIMIT $2
            "
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to list device sessions")?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn create_login_code(
        &self,
        email: &str,
        code: &str,
        ttl: Duration,
        max_attempts: i32,
    ) -> Result<LoginCode> {
        let now = self.clock.now();
        let query = r"
            INSERT INTO login_codes (id, email, code_hash, expires_at, max_attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, code_hash, expires_at, consumed_at, attempts, max_attempts, created_at
        ";
        let row = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(normalize_email(email))
            .bind(hash_token(code))
            .bind(now + ttl)
            .bind(max_attempts)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert login code")?;
        Ok(LoginCode {
            id: row.get("id"),
            email: row.get("email"),
            code_hash: row.get("code_hash"),
            expires_at: row.get("expires_at"),
            consumed_at: row.get("consumed_at"),
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
            created_at: row.get("created_at"),
        })
    }

    async fn consume_login_code(&self, challenge_id: Uuid, code: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let query = r"
            UPDATE login_codes SET consumed_at = $3
            WHERE id = $1 AND code_hash = $2
              AND consumed_at IS NULL AND expires_at > $3 AND attempts < max_attempts
            RETURNING email
        ";
        let row = sqlx::query(query)
            .bind(challenge_id)
            .bind(hash_token(code))
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to consume login code")?;
        if let Some(row) = row {
            return Ok(Some(row.get("email")));
        }

        let query = r"
            UPDATE login_codes SET attempts = attempts + 1
            WHERE id = $1 AND consumed_at IS NULL AND expires_at > $2
        ";
        sqlx::query(query)
            .bind(challenge_id)
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to count login code attempt")?;
        Ok(None)
    }

    async fn create_impersonation(
        &self,
        admin_id: UserId,
        target_id: UserId,
        ttl: Duration,
    ) -> Result<ImpersonationIssue> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let query = format!(
            r"
            INSERT INTO impersonation_tokens
                (id, token_hash, admin_id, target_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {IMPERSONATION_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(hash_token(&plaintext))
            .bind(admin_id)
            .bind(target_id)
            .bind(now + ttl)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .context("failed to insert impersonation token")?;
        Ok(ImpersonationIssue {
            record: impersonation_from_row(&row),
            plaintext,
        })
    }

    async fn find_impersonation(&self, plaintext: &str) -> Result<Option<ImpersonationToken>> {
        let query =
            format!("SELECT {IMPERSONATION_COLUMNS} FROM impersonation_tokens WHERE token_hash = $1");
        let row = sqlx::query(&query)
            .bind(hash_token(plaintext))
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .context("failed to lookup impersonation token")?;
        Ok(row.as_ref().map(impersonation_from_row))
    }

    async fn redeem_impersonation(
        &self,
        token_id: Uuid,
        new_session: NewSession,
    ) -> Result<Option<OpenedSession>> {
        let plaintext = generate_token()?;
        let now = self.clock.now();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin impersonation transaction")?;

        let query = r"
            UPDATE impersonation_tokens SET used_at = $2
            WHERE id = $1 AND used_at IS NULL AND expires_at > $2
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(token_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to mark impersonation token used")?;
        if row.is_none() {
            return Ok(None);
        }
        let Some(opened) = open_in(&mut tx, new_session, plaintext, now).await? else {
            return Ok(None);
        };
        tx.commit()
            .await
            .context("commit impersonation transaction")?;
        Ok(Some(opened))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::SystemClock;
    use sqlx::postgres::PgPoolOptions;

    async fn test_store() -> Result<Option<PgCredentialStore>> {
        let Ok(dsn) = std::env::var("FITQ_TEST_DSN") else {
            eprintln!("Skipping integration test: FITQ_TEST_DSN not set");
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&dsn)
            .await
            .context("connect to FITQ_TEST_DSN")?;
        Ok(Some(PgCredentialStore::new(pool, Arc::new(SystemClock))))
    }

    fn enroll(email: String) -> NewSession {
        NewSession {
            owner: SessionOwner::Enroll {
                email,
                display_name: None,
            },
            device: DeviceContext::new("Web Browser", Some("127.0.0.1".to_string()), None),
            refresh_ttl: Duration::days(365),
            impersonated_by: None,
        }
    }

    #[tokio::test]
    async fn concurrent_rotation_has_one_winner() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let email = format!("rotate-{}@example.com", Uuid::new_v4());
        let Some(opened) = store.open_session(enroll(email)).await? else {
            anyhow::bail!("expected session");
        };
        let plain = opened.refresh.plaintext.clone();
        let (a, b) = tokio::join!(
            store.rotate_refresh(&plain, Duration::days(365)),
            store.rotate_refresh(&plain, Duration::days(365)),
        );
        let winners = [a?, b?].into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(winners.len(), 1);
        assert!(store.validate_refresh(&plain).await?.is_none());
        let Some((_, session)) = store.validate_refresh(&winners[0].refresh.plaintext).await?
        else {
            anyhow::bail!("successor should validate");
        };
        assert_eq!(session.id, opened.session.id);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_login_code_consumption_has_one_winner() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let code = store
            .create_login_code("code@example.com", "482913", Duration::minutes(10), 5)
            .await?;
        let (a, b) = tokio::join!(
            store.consume_login_code(code.id, "482913"),
            store.consume_login_code(code.id, "482913"),
        );
        assert_eq!([a?, b?].into_iter().flatten().count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn enrollment_is_case_insensitive() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };
        let local = Uuid::new_v4();
        let (Some(first), Some(second)) = (
            store
                .open_session(enroll(format!("Case-{local}@Example.com")))
                .await?,
            store
                .open_session(enroll(format!("case-{local}@example.com")))
                .await?,
        ) else {
            anyhow::bail!("expected sessions");
        };
        assert_eq!(first.user.id, second.user.id);
        assert!(first.user_created);
        assert!(!second.user_created);
        Ok(())
    }
}
