use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use lms_models::{NewSession, Session};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Session registry: owns the lifecycle of server-side session rows keyed
/// by `session_key` (the issued token's `jti`). Invalidation is terminal;
/// hard deletion is a separate retention step.
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new session. The caller supplies `session_key`; a unique
    /// violation surfaces as `DuplicateKey` since key uniqueness is the
    /// trust anchor for token binding.
    pub async fn create(&self, new_session: &NewSession) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (
                user_id, session_key, session_class, ip_address, user_agent,
                device_type, login_method, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(new_session.user_id)
        .bind(&new_session.session_key)
        .bind(&new_session.session_class)
        .bind(&new_session.ip_address)
        .bind(&new_session.user_agent)
        .bind(&new_session.device_type)
        .bind(&new_session.login_method)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    /// Resolve a session by key with an exclusive row lock, held until the
    /// caller's transaction commits. Two requests racing to validate and
    /// invalidate the same session serialize here.
    pub async fn get_for_validation(
        &self,
        conn: &mut PgConnection,
        session_key: &str,
    ) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE session_key = $1
            FOR UPDATE
            "#,
        )
        .bind(session_key)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Session not found".to_string()))?;

        Ok(session)
    }

    /// Mark a session inactive inside the caller's transaction. Idempotent:
    /// invalidating an already-inactive session affects zero rows and is
    /// not an error.
    pub async fn invalidate(&self, conn: &mut PgConnection, session_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sessions SET is_active = false WHERE id = $1")
            .bind(session_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Write `last_activity` inside the caller's transaction. Callers are
    /// expected to throttle this rather than invoking it per request.
    pub async fn touch_activity(
        &self,
        conn: &mut PgConnection,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_activity = $1 WHERE id = $2")
            .bind(now)
            .bind(session_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Move `expires_at` forward to `target`. GREATEST keeps the column
    /// monotonically non-decreasing: a stale or short extension can never
    /// shorten an active session. Returns the resulting expiry.
    pub async fn extend(
        &self,
        session_id: Uuid,
        target: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let expires_at: DateTime<Utc> = sqlx::query_scalar(
            r#"
            UPDATE sessions
            SET expires_at = GREATEST(expires_at, $1)
            WHERE id = $2 AND is_active = true
            RETURNING expires_at
            "#,
        )
        .bind(target)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound("Session not found or inactive".to_string()))?;

        Ok(expires_at)
    }

    /// Invalidate every active session for a user in one statement,
    /// optionally sparing one key (password change from a live session).
    /// Returns the exact number of sessions deactivated.
    pub async fn invalidate_all_for_user(
        &self,
        user_id: Uuid,
        exclude_session_key: Option<&str>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = false
            WHERE user_id = $1
              AND is_active = true
              AND ($2::text IS NULL OR session_key <> $2)
            "#,
        )
        .bind(user_id)
        .bind(exclude_session_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Invalidate one session scoped to its owning user. Returns false when
    /// no matching active session exists; scoping by user avoids leaking
    /// whether the key belongs to someone else.
    pub async fn invalidate_one(&self, user_id: Uuid, session_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = false
            WHERE user_id = $1 AND session_key = $2 AND is_active = true
            "#,
        )
        .bind(user_id)
        .bind(session_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deactivate up to `batch_size` expired-but-active sessions. SKIP
    /// LOCKED keeps the sweep from queueing behind request transactions
    /// holding individual row locks.
    pub async fn deactivate_expired_batch(&self, batch_size: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            WITH expired AS (
                SELECT id FROM sessions
                WHERE is_active = true AND expires_at < NOW()
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE sessions s
            SET is_active = false
            FROM expired
            WHERE s.id = expired.id
            "#,
        )
        .bind(batch_size)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Count of currently valid sessions for a user.
    pub async fn active_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE user_id = $1 AND is_active = true AND expires_at >= NOW()
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// All currently valid sessions for a user, newest first.
    pub async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE user_id = $1 AND is_active = true AND expires_at >= NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Hard-remove all session rows for a user. Retention step used after
    /// account deletion, distinct from invalidation.
    pub async fn delete_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
