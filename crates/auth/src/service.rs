use crate::config::AuthConfig;
use crate::error::{AuthError, Result};
use crate::gate::{AuthContext, AuthGate};
use crate::jwt::{JwtService, SessionClass};
use crate::lockout::{AccountLockoutService, AttemptContext};
use crate::password::PasswordHasher;
use crate::revocation::SessionRevocationService;
use chrono::{DateTime, Duration, Utc};
use lms_cache::Cache;
use lms_database::{Database, DatabaseError, SessionRepository, UserRepository};
use lms_models::{ChangePassword, NewSession, User, UserProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    pub password: String,

    #[serde(default)]
    pub session_class: SessionClass,

    // Request context, captured onto the session row
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Explicit login/refresh/logout/password-change orchestration. Each use
/// case is a plain sequence of calls -- credentials, lock check, session
/// creation, token minting -- with no storage-side hooks.
pub struct AuthService {
    pub gate: AuthGate,
    pub lockout: AccountLockoutService,
    pub revocation: SessionRevocationService,
    jwt: JwtService,
    users: UserRepository,
    sessions: SessionRepository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Database, cache: Cache, config: AuthConfig) -> Self {
        let pool = db.pool().clone();
        let jwt = JwtService::new(&config.jwt_secret, config.lifetimes.access_token_minutes);

        Self {
            gate: AuthGate::new(db.clone(), cache, jwt.clone(), config.activity_throttle_secs),
            lockout: AccountLockoutService::new(&db, config.lockout.clone()),
            revocation: SessionRevocationService::new(
                &db,
                config.cleanup_batch_size,
                config.cleanup_batch_pause_ms,
                config.attempt_log_retention_days,
            ),
            jwt,
            users: UserRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool),
            config,
        }
    }

    /// Login with email and password. The login path is allowed to tell a
    /// locked-out caller so (they presented a password, not a bearer
    /// token); every other failure collapses to InvalidCredentials.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        request.validate()?;

        let context = AttemptContext {
            email: request.email.clone(),
            ip_address: request
                .ip_address
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: request.user_agent.clone(),
        };

        let user = match self.users.find_by_email(&request.email).await {
            Ok(user) => user,
            Err(DatabaseError::NotFound(_)) => {
                // Logged for audit with no account to count against.
                self.lockout
                    .record_attempt(None, &context, false, Some("unknown_email"))
                    .await?;
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        // An expired lock clears before it can reject anyone.
        self.lockout.unlock_if_expired(user.id).await?;

        if let Some(locked_until) = self.lockout.is_locked(&user) {
            self.lockout
                .record_attempt(Some(user.id), &context, false, Some("account_locked"))
                .await?;
            return Err(AuthError::AccountLocked { locked_until });
        }

        if !user.is_active {
            self.lockout
                .record_attempt(Some(user.id), &context, false, Some("account_inactive"))
                .await?;
            return Err(AuthError::AccountInactive);
        }

        // Accounts provisioned without a password (external identity) can
        // never pass this path; the failure still counts and is logged.
        let verified = match user.password_hash.as_deref() {
            Some(hash) => PasswordHasher::verify(&request.password, hash)?,
            None => false,
        };

        if !verified {
            let locked = self
                .lockout
                .record_attempt(Some(user.id), &context, false, Some("invalid_credentials"))
                .await?;

            // The failure that crosses the threshold reports the lock.
            return Err(match locked {
                Some(locked_until) => AuthError::AccountLocked { locked_until },
                None => AuthError::InvalidCredentials,
            });
        }

        self.lockout
            .record_attempt(Some(user.id), &context, true, None)
            .await?;

        let response = self
            .open_session(
                &user,
                request.session_class,
                request.ip_address,
                request.user_agent,
                request.device_type,
                "password",
            )
            .await?;

        self.warn_on_session_limit(user.id).await;

        Ok(response)
    }

    /// Rotate a refresh token: the presented token's session is validated
    /// and retired under its row lock, then a fresh session and pair are
    /// issued carrying over the old session's context.
    pub async fn refresh(&self, request: RefreshTokenRequest) -> Result<LoginResponse> {
        let claims = self.jwt.validate_refresh_token(&request.refresh_token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::MalformedToken("subject is not a user id".to_string()))?;

        let old = self.gate.consume_session(&claims.jti, user_id).await?;

        // A rotated session keeps its predecessor's class and gets that
        // class's default lifetime; an extension granted to the old
        // session does not carry across rotation.
        let class = SessionClass::parse(&old.session.session_class).unwrap_or_default();

        self.open_session(
            &old.user,
            class,
            old.session.ip_address.clone(),
            old.session.user_agent.clone(),
            old.session.device_type.clone(),
            "refresh",
        )
        .await
    }

    /// Logout: revoke the current session. Idempotent from the caller's
    /// point of view.
    pub async fn logout(&self, ctx: &AuthContext) -> Result<()> {
        self.revocation
            .revoke_one(ctx.user.id, &ctx.session.session_key)
            .await?;
        Ok(())
    }

    /// Change password and revoke every other session for the account. The
    /// session performing the change survives. Returns the number of
    /// sessions revoked.
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        request: ChangePassword,
    ) -> Result<u64> {
        request.validate()?;

        let current_hash = ctx
            .user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if !PasswordHasher::verify(&request.current_password, current_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = PasswordHasher::hash(&request.new_password)?;
        self.users.update_password(ctx.user.id, &new_hash).await?;

        self.revocation
            .revoke_all(ctx.user.id, Some(&ctx.session.session_key))
            .await
    }

    /// Extend the current session's lifetime. Requests beyond the
    /// configured cap are silently clamped, never rejected.
    pub async fn extend_session(
        &self,
        ctx: &AuthContext,
        requested_hours: i64,
    ) -> Result<DateTime<Utc>> {
        let target = clamped_extension_target(
            Utc::now(),
            requested_hours,
            self.config.max_extension_hours,
        );

        self.sessions
            .extend(ctx.session.id, target)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => AuthError::SessionExpired,
                other => other.into(),
            })
    }

    /// Admin force-logout: revoke every session for the account.
    pub async fn force_logout(&self, user_id: Uuid) -> Result<u64> {
        self.revocation.revoke_all(user_id, None).await
    }

    /// List the account's currently valid sessions.
    pub async fn list_sessions(&self, user_id: Uuid) -> Result<Vec<lms_models::Session>> {
        Ok(self.sessions.list_active_for_user(user_id).await?)
    }

    async fn open_session(
        &self,
        user: &User,
        class: SessionClass,
        ip_address: Option<String>,
        user_agent: Option<String>,
        device_type: Option<String>,
        login_method: &str,
    ) -> Result<LoginResponse> {
        let session_key = JwtService::generate_session_key();
        let ttl = class.session_ttl(&self.config.lifetimes);
        let expires_at = Utc::now() + ttl;

        let pair = self.jwt.issue_pair(user.id, &session_key, ttl)?;

        let session = self
            .sessions
            .create(&NewSession {
                user_id: user.id,
                session_key,
                session_class: class.as_str().to_string(),
                ip_address,
                user_agent,
                device_type,
                login_method: login_method.to_string(),
                expires_at,
            })
            .await
            .map_err(|e| match e {
                // jti collisions are an invariant breach, not a user error
                DatabaseError::DuplicateKey(msg) => {
                    AuthError::Internal(format!("session key collision: {}", msg))
                }
                other => other.into(),
            })?;

        Ok(LoginResponse {
            access: pair.access,
            refresh: pair.refresh,
            session_id: session.id,
            expires_at: session.expires_at,
            user: user.clone().into(),
        })
    }

    async fn warn_on_session_limit(&self, user_id: Uuid) {
        match self.revocation.active_count(user_id).await {
            Ok(count) if count > self.config.max_concurrent_sessions => {
                tracing::warn!(
                    user_id = %user_id,
                    active_sessions = count,
                    limit = self.config.max_concurrent_sessions,
                    "concurrent session soft limit exceeded"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "failed to read active session count");
            }
        }
    }
}

/// New expiry for an extension request: `now + min(requested, cap)` hours.
/// The registry additionally refuses to move expiry backwards.
fn clamped_extension_target(
    now: DateTime<Utc>,
    requested_hours: i64,
    max_extension_hours: i64,
) -> DateTime<Utc> {
    let hours = requested_hours.clamp(0, max_extension_hours);
    now + Duration::hours(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_clamped_to_cap() {
        let now = Utc::now();

        assert_eq!(
            clamped_extension_target(now, 24, 168),
            now + Duration::hours(24)
        );
        // Arbitrarily large requests land exactly on the cap.
        assert_eq!(
            clamped_extension_target(now, 10_000, 168),
            now + Duration::hours(168)
        );
        assert_eq!(
            clamped_extension_target(now, i64::MAX / 4, 168),
            now + Duration::hours(168)
        );
        // Negative requests never pull expiry before now.
        assert_eq!(clamped_extension_target(now, -5, 168), now);
    }
}
