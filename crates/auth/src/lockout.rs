use crate::config::LockoutPolicy;
use crate::error::Result;
use chrono::{DateTime, Utc};
use lms_database::{Database, LoginAttemptRepository, UserRepository};
use lms_models::{NewLoginAttempt, User};
use uuid::Uuid;

/// Network/client context of a login attempt, recorded for audit.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub email: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

/// Escalating account lockout. State lives on the account row
/// (`failed_login_attempts`, `locked_until`); every attempt is additionally
/// appended to the audit log regardless of outcome.
///
/// States: Active (no lock, or lock in the past) -> Locked (lock in the
/// future) -> Active again once the timestamp passes or on explicit unlock.
pub struct AccountLockoutService {
    users: UserRepository,
    attempts: LoginAttemptRepository,
    policy: LockoutPolicy,
}

impl AccountLockoutService {
    pub fn new(db: &Database, policy: LockoutPolicy) -> Self {
        Self {
            users: UserRepository::new(db.pool().clone()),
            attempts: LoginAttemptRepository::new(db.pool().clone()),
            policy,
        }
    }

    /// Record a login attempt. Success atomically resets counter and lock;
    /// failure atomically increments the counter (single UPDATE, so
    /// concurrent failures all land) and applies the escalation policy to
    /// the post-increment value. Lock writes never shorten a lock already
    /// in force, so concurrent attempts crossing different thresholds may
    /// commit in either order. Returns the lock applied, if any.
    pub async fn record_attempt(
        &self,
        user_id: Option<Uuid>,
        context: &AttemptContext,
        succeeded: bool,
        failure_reason: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.attempts
            .record(&NewLoginAttempt {
                user_id,
                email: context.email.clone(),
                ip_address: context.ip_address.clone(),
                user_agent: context.user_agent.clone(),
                successful: succeeded,
                failure_reason: failure_reason.map(String::from),
            })
            .await?;

        let Some(user_id) = user_id else {
            // Unresolvable email: nothing to count against.
            return Ok(None);
        };

        if succeeded {
            self.users.record_successful_login(user_id).await?;
            return Ok(None);
        }

        let count = self
            .users
            .increment_failed_attempts(user_id, self.policy.attempt_ceiling)
            .await?;

        let Some(duration) = self.policy.lock_duration_for(count) else {
            return Ok(None);
        };

        let locked_until = Utc::now() + duration;
        self.users.set_locked_until(user_id, locked_until).await?;

        tracing::warn!(
            user_id = %user_id,
            failed_attempts = count,
            locked_until = %locked_until,
            "account locked after repeated failed logins"
        );

        Ok(Some(locked_until))
    }

    /// Whether the account is inside a lockout window right now. The check
    /// is independent of the counter: a correct password for a locked
    /// account is still rejected by the caller.
    pub fn is_locked(&self, user: &User) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        user.locked_until.filter(|until| now < *until)
    }

    /// Clear counter and lock once the lock has passed. Idempotent and safe
    /// to call opportunistically on every authentication attempt. Returns
    /// whether anything was cleared.
    pub async fn unlock_if_expired(&self, user_id: Uuid) -> Result<bool> {
        let cleared = self.users.clear_expired_lock(user_id).await?;
        if cleared {
            tracing::info!(user_id = %user_id, "expired lockout cleared");
        }
        Ok(cleared)
    }

    /// Admin unlock, regardless of the lock's expiry.
    pub async fn unlock(&self, user_id: Uuid) -> Result<()> {
        self.users.clear_lockout(user_id).await?;
        tracing::info!(user_id = %user_id, "account manually unlocked");
        Ok(())
    }
}
