use crate::error::Result;
use lms_models::NewLoginAttempt;
use sqlx::PgPool;
use uuid::Uuid;

/// Append-only login attempt log, written for every attempt regardless of
/// outcome.
pub struct LoginAttemptRepository {
    pool: PgPool,
}

impl LoginAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, attempt: &NewLoginAttempt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts
                (user_id, email, ip_address, user_agent, successful, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(attempt.user_id)
        .bind(&attempt.email)
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.successful)
        .bind(&attempt.failure_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Failed attempts for a user within the last `minutes`. Used for audit
    /// queries, not for lockout decisions (those read the account counter).
    pub async fn recent_failures(&self, user_id: Uuid, minutes: i32) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM login_attempts
            WHERE user_id = $1
              AND successful = false
              AND attempted_at > NOW() - make_interval(mins => $2)
            "#,
        )
        .bind(user_id)
        .bind(minutes)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Drop attempt rows older than the retention window. The log would
    /// otherwise grow unbounded.
    pub async fn prune_older_than(&self, days: i32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM login_attempts WHERE attempted_at < NOW() - make_interval(days => $1)",
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
