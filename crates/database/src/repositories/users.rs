use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use lms_models::{NewUser, User};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Account store: credential and lockout state, one row per account.
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user account
    pub async fn create(&self, new_user: &NewUser, password_hash: Option<&str>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&new_user.email)
        .bind(password_hash)
        .bind(&new_user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, user_id: Uuid) -> Result<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {} not found", user_id)))?;

        Ok(user)
    }

    /// Variant of `find_by_id` running on the caller's transaction so the
    /// authentication gate resolves the account inside the same unit of
    /// work that holds the session row lock.
    pub async fn find_by_id_on(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {} not found", user_id)))?;

        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("User not found".to_string()))?;

        Ok(user)
    }

    /// Atomically increment the failed-login counter and return the new
    /// value. The increment happens in a single UPDATE so concurrent
    /// failures against the same account all land (no read-modify-write,
    /// no lost updates). Increments past `ceiling` are rejected: the row
    /// is left unchanged and the stored count is returned instead.
    pub async fn increment_failed_attempts(&self, user_id: Uuid, ceiling: i32) -> Result<i32> {
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                updated_at = NOW()
            WHERE id = $1 AND failed_login_attempts < $2
            RETURNING failed_login_attempts
            "#,
        )
        .bind(user_id)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(count) => Ok(count),
            None => {
                // Counter is at the ceiling (or the user vanished); report
                // the stored value without mutating it.
                let count: i32 =
                    sqlx::query_scalar("SELECT failed_login_attempts FROM users WHERE id = $1")
                        .bind(user_id)
                        .fetch_optional(&self.pool)
                        .await?
                        .ok_or_else(|| {
                            DatabaseError::NotFound(format!("User {} not found", user_id))
                        })?;
                Ok(count)
            }
        }
    }

    /// Set the lockout window on an account. GREATEST keeps the column
    /// monotonic while a lock is in force: two attempts racing across
    /// different thresholds can commit their lock writes in either order,
    /// and the longer lock must survive.
    pub async fn set_locked_until(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET locked_until = GREATEST(locked_until, $1),
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(until)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reset lockout state after a successful login: counter to zero, lock
    /// cleared, last-login stamped. Single UPDATE so the invariant
    /// (counter == 0 whenever unlocked after a success) holds atomically.
    pub async fn record_successful_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clear the lock and counter once the lock timestamp has passed.
    /// Idempotent; the WHERE clause makes it a no-op on unlocked accounts
    /// and on locks still in force, so it is safe to call on every
    /// authentication attempt.
    pub async fn clear_expired_lock(&self, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND locked_until IS NOT NULL
              AND locked_until <= NOW()
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transaction-scoped variant of `clear_expired_lock` for the gate's
    /// opportunistic unlock.
    pub async fn clear_expired_lock_on(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND locked_until IS NOT NULL
              AND locked_until <= NOW()
            "#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Manual unlock (admin action): clears the lock regardless of expiry.
    pub async fn clear_lockout(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET failed_login_attempts = 0,
                locked_until = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Database, DatabaseConfig};
    use chrono::Duration;
    use lms_models::{NewUser, UserRole};

    async fn setup() -> (Database, UserRepository) {
        let db = Database::new(DatabaseConfig::from_env())
            .await
            .expect("Failed to connect to database");
        let users = UserRepository::new(db.pool().clone());
        (db, users)
    }

    async fn seed_user(users: &UserRepository) -> User {
        users
            .create(
                &NewUser {
                    email: format!("{}@test.example", Uuid::new_v4()),
                    password: None,
                    role: UserRole::Student,
                },
                None,
            )
            .await
            .expect("Failed to create user")
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_concurrent_failure_increments_all_land() {
        let (db, users) = setup().await;
        let user = seed_user(&users).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = UserRepository::new(db.pool().clone());
            let user_id = user.id;
            handles.push(tokio::spawn(async move {
                repo.increment_failed_attempts(user_id, 10_000).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reloaded = users.find_by_id(user.id).await.unwrap();
        assert_eq!(reloaded.failed_login_attempts, 8);
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_longer_lock_survives_out_of_order_writes() {
        let (_db, users) = setup().await;
        let user = seed_user(&users).await;
        let now = Utc::now();

        // Escalated lock commits first, soft lock commits second; the
        // account must stay locked for the full escalated window.
        users
            .set_locked_until(user.id, now + Duration::hours(24))
            .await
            .unwrap();
        users
            .set_locked_until(user.id, now + Duration::minutes(15))
            .await
            .unwrap();

        let reloaded = users.find_by_id(user.id).await.unwrap();
        let locked_until = reloaded.locked_until.expect("lock should be set");
        assert!(locked_until >= now + Duration::hours(24) - Duration::seconds(1));
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_increment_rejected_at_ceiling() {
        let (_db, users) = setup().await;
        let user = seed_user(&users).await;

        assert_eq!(users.increment_failed_attempts(user.id, 2).await.unwrap(), 1);
        assert_eq!(users.increment_failed_attempts(user.id, 2).await.unwrap(), 2);
        // At the ceiling the row is left unchanged and the stored count
        // is reported.
        assert_eq!(users.increment_failed_attempts(user.id, 2).await.unwrap(), 2);
    }
}
