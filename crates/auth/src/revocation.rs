use crate::error::{AuthError, Result};
use lms_database::{Database, DatabaseError, LoginAttemptRepository, SessionRepository};
use std::time::Duration;
use uuid::Uuid;

/// Bulk and targeted session invalidation plus the batched expiry sweep.
/// Callers are trusted (account-management and admin flows), so failures
/// surface in full rather than collapsing to a generic rejection.
pub struct SessionRevocationService {
    sessions: SessionRepository,
    attempts: LoginAttemptRepository,
    cleanup_batch_size: i64,
    cleanup_batch_pause: Duration,
    attempt_log_retention_days: i32,
}

impl SessionRevocationService {
    pub fn new(
        db: &Database,
        cleanup_batch_size: i64,
        cleanup_batch_pause_ms: u64,
        attempt_log_retention_days: i32,
    ) -> Self {
        Self {
            sessions: SessionRepository::new(db.pool().clone()),
            attempts: LoginAttemptRepository::new(db.pool().clone()),
            cleanup_batch_size,
            cleanup_batch_pause: Duration::from_millis(cleanup_batch_pause_ms),
            attempt_log_retention_days,
        }
    }

    /// Invalidate every active session for an account in a single atomic
    /// statement, optionally sparing one session (password change from a
    /// live session). Returns the exact count deactivated.
    pub async fn revoke_all(
        &self,
        user_id: Uuid,
        exclude_session_key: Option<&str>,
    ) -> Result<u64> {
        let count = self
            .sessions
            .invalidate_all_for_user(user_id, exclude_session_key)
            .await
            .map_err(revocation_error)?;

        tracing::info!(
            user_id = %user_id,
            revoked = count,
            excluded = exclude_session_key.is_some(),
            "bulk session revocation"
        );

        Ok(count)
    }

    /// Invalidate one session belonging to the account. Returns false when
    /// no matching active session exists -- not an error, and no signal
    /// about keys owned by other accounts.
    pub async fn revoke_one(&self, user_id: Uuid, session_key: &str) -> Result<bool> {
        let revoked = self
            .sessions
            .invalidate_one(user_id, session_key)
            .await
            .map_err(revocation_error)?;

        if revoked {
            tracing::info!(user_id = %user_id, "session revoked");
        }

        Ok(revoked)
    }

    /// Deactivate all expired-but-active sessions in bounded batches with a
    /// brief pause between them, so the sweep never holds broad locks or
    /// starves request traffic. Loops until a sweep finds nothing; returns
    /// the total deactivated.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let mut total: u64 = 0;

        loop {
            let batch = self
                .sessions
                .deactivate_expired_batch(self.cleanup_batch_size)
                .await
                .map_err(revocation_error)?;

            if batch == 0 {
                break;
            }

            total += batch;
            tokio::time::sleep(self.cleanup_batch_pause).await;
        }

        if total > 0 {
            tracing::info!(deactivated = total, "expired session sweep complete");
        }

        Ok(total)
    }

    /// Count of currently valid sessions for an account; backs the soft
    /// concurrent-session limit.
    pub async fn active_count(&self, user_id: Uuid) -> Result<i64> {
        Ok(self.sessions.active_count(user_id).await?)
    }

    /// Account-deletion hook: revoke everything, then hard-delete the rows.
    /// Returns the number of rows removed.
    pub async fn purge_account(&self, user_id: Uuid) -> Result<u64> {
        self.revoke_all(user_id, None).await?;

        let deleted = self
            .sessions
            .delete_for_user(user_id)
            .await
            .map_err(revocation_error)?;

        tracing::info!(user_id = %user_id, deleted = deleted, "session rows purged");
        Ok(deleted)
    }

    /// Drop attempt-log rows past the retention window.
    pub async fn prune_attempt_log(&self) -> Result<u64> {
        let pruned = self
            .attempts
            .prune_older_than(self.attempt_log_retention_days)
            .await?;

        if pruned > 0 {
            tracing::info!(pruned = pruned, "login attempt log pruned");
        }

        Ok(pruned)
    }
}

/// Storage failures during revocation stay distinct and retryable for the
/// trusted caller; transient errors keep their own kind.
fn revocation_error(err: DatabaseError) -> AuthError {
    if err.is_transient() {
        AuthError::TransientStorage(err.to_string())
    } else {
        AuthError::RevocationFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use lms_database::{DatabaseConfig, UserRepository};
    use lms_models::{NewSession, NewUser, UserRole};

    async fn setup() -> (Database, SessionRevocationService) {
        let db = Database::new(DatabaseConfig::from_env())
            .await
            .expect("Failed to connect to database");
        // Batch size 2 so a handful of rows spans several sweep batches.
        let svc = SessionRevocationService::new(&db, 2, 0, 90);
        (db, svc)
    }

    async fn seed_user(db: &Database) -> Uuid {
        UserRepository::new(db.pool().clone())
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
            .id
    }

    async fn seed_session(db: &Database, user_id: Uuid, expires_at: DateTime<Utc>) -> String {
        let key = Uuid::new_v4().to_string();
        SessionRepository::new(db.pool().clone())
            .create(&NewSession {
                user_id,
                session_key: key.clone(),
                session_class: "web".to_string(),
                ip_address: None,
                user_agent: None,
                device_type: None,
                login_method: "password".to_string(),
                expires_at,
            })
            .await
            .expect("Failed to create session");
        key
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_revoke_all_spares_excluded_session() {
        let (db, svc) = setup().await;
        let user = seed_user(&db).await;
        let keep = seed_session(&db, user, Utc::now() + Duration::days(1)).await;
        for _ in 0..3 {
            seed_session(&db, user, Utc::now() + Duration::days(1)).await;
        }

        let revoked = svc.revoke_all(user, Some(&keep)).await.unwrap();

        assert_eq!(revoked, 3);
        assert_eq!(svc.active_count(user).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_revoke_one_is_scoped_to_owner() {
        let (db, svc) = setup().await;
        let owner = seed_user(&db).await;
        let other = seed_user(&db).await;
        let key = seed_session(&db, owner, Utc::now() + Duration::days(1)).await;

        // Another account's key looks exactly like a missing one.
        assert!(!svc.revoke_one(other, &key).await.unwrap());
        assert!(svc.revoke_one(owner, &key).await.unwrap());
        // Already revoked: false, not an error.
        assert!(!svc.revoke_one(owner, &key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_cleanup_sweeps_expired_across_batches() {
        let (db, svc) = setup().await;
        let user = seed_user(&db).await;
        for _ in 0..5 {
            seed_session(&db, user, Utc::now() - Duration::hours(1)).await;
        }
        let live = seed_session(&db, user, Utc::now() + Duration::days(1)).await;

        // Other expired rows may be swept alongside ours.
        let swept = svc.cleanup_expired().await.unwrap();
        assert!(swept >= 5);

        assert_eq!(svc.active_count(user).await.unwrap(), 1);
        assert!(svc.revoke_one(user, &live).await.unwrap());
    }
}
