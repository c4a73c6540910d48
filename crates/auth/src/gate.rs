use crate::error::{AuthError, Result};
use crate::jwt::JwtService;
use chrono::Utc;
use lms_cache::{activity_marker_key, Cache};
use lms_database::{Database, DatabaseError, SessionRepository, UserRepository};
use lms_models::{Session, User};
use uuid::Uuid;

/// Authenticated request context; attached to the request so downstream
/// handlers (logout, password change) can act on the current session.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

const SESSION_TOKEN_MIN_LEN: usize = 32;

/// Format gate for the opaque session-token header: fixed minimum length,
/// alphanumeric plus hyphen. Rejects before any storage access.
pub fn is_well_formed_session_token(token: &str) -> bool {
    token.len() >= SESSION_TOKEN_MIN_LEN
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Per-request authentication pipeline. The step order is the security
/// contract:
///
/// 1. verify token signature + expiry (no storage access, cannot block)
/// 2. require a `jti` session binding
/// 3. resolve and row-lock the session by `jti` -- before the account,
///    so an orphaned-but-valid token cannot probe account existence
/// 4. invalid session: defensively invalidate, reject
/// 5. resolve the account from the token subject
/// 6. session/account binding check
/// 7. locked account: invalidate session, reject
/// 8. opportunistically clear an expired lock
/// 9. throttled activity write
/// 10. hand back the account and session
///
/// All of 3-9 run in one transaction holding the session row lock; the
/// throttle-marker cache round trips happen outside it.
pub struct AuthGate {
    db: Database,
    users: UserRepository,
    sessions: SessionRepository,
    jwt: JwtService,
    cache: Cache,
    activity_throttle_secs: u64,
}

impl AuthGate {
    pub fn new(
        db: Database,
        cache: Cache,
        jwt: JwtService,
        activity_throttle_secs: u64,
    ) -> Self {
        let pool = db.pool().clone();
        Self {
            db,
            users: UserRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool),
            jwt,
            cache,
            activity_throttle_secs,
        }
    }

    /// Authenticate a signed bearer token (steps 1-10).
    pub async fn authenticate_bearer(&self, token: &str) -> Result<AuthContext> {
        // Steps 1-2: cryptographic validation and session binding, before
        // any session or account state is touched.
        let claims = self.jwt.validate_access_token(token)?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AuthError::MalformedToken("subject is not a user id".to_string()))?;

        self.check_session(&claims.jti, Some(user_id), true, false)
            .await
    }

    /// Authenticate a long-lived opaque session token presented via the
    /// dedicated header. No signature to verify; steps 3-9 apply
    /// identically, with the account resolved from the session row.
    pub async fn authenticate_session_token(&self, token: &str) -> Result<AuthContext> {
        if !is_well_formed_session_token(token) {
            return Err(AuthError::MalformedToken(
                "session token fails format requirements".to_string(),
            ));
        }

        self.check_session(token, None, true, false).await
    }

    /// Validate and retire a session in the same unit of work, under the
    /// same row lock; used by refresh rotation so the old session cannot be
    /// accepted by a concurrent request once rotation has begun.
    pub async fn consume_session(
        &self,
        session_key: &str,
        expected_user: Uuid,
    ) -> Result<AuthContext> {
        self.check_session(session_key, Some(expected_user), false, true)
            .await
    }

    /// Steps 3-9. `expected_user` is the token's subject on the bearer
    /// path and None on the opaque path; `consume` additionally invalidates
    /// the session before the lock is released.
    async fn check_session(
        &self,
        session_key: &str,
        expected_user: Option<Uuid>,
        touch: bool,
        consume: bool,
    ) -> Result<AuthContext> {
        let now = Utc::now();

        // Cache round trip happens before the row lock is taken; the lock
        // is never held across a network call.
        let touch_due = touch && self.activity_write_due(session_key).await;

        let mut tx = self.db.pool().begin().await.map_err(DatabaseError::from)?;

        // Step 3: session first. NotFound stays distinct server-side but
        // is indistinguishable from an expired session to the client.
        let session = self
            .sessions
            .get_for_validation(&mut tx, session_key)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => AuthError::SessionNotFound,
                other => other.into(),
            })?;

        // Step 4: expired-but-still-marked-active rows get retired here.
        if !session.is_valid(now) {
            self.sessions.invalidate(&mut tx, session.id).await?;
            tx.commit().await.map_err(DatabaseError::from)?;
            return Err(AuthError::SessionExpired);
        }

        // Step 5: only now is the account resolved.
        let user_id = expected_user.unwrap_or(session.user_id);
        let user = self
            .users
            .find_by_id_on(&mut tx, user_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => AuthError::AccountNotFound,
                other => other.into(),
            })?;

        // Step 6: token/session substitution guard.
        if session.user_id != user.id {
            return Err(AuthError::BindingMismatch);
        }

        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }

        // Step 7: a live lock kills the session.
        if user.is_locked_at(now) {
            self.sessions.invalidate(&mut tx, session.id).await?;
            tx.commit().await.map_err(DatabaseError::from)?;
            return Err(AuthError::AccountLocked {
                locked_until: user.locked_until.unwrap_or(now),
            });
        }

        // Step 8: expired locks are cleared opportunistically.
        self.users.clear_expired_lock_on(&mut tx, user.id).await?;

        // Step 9: at most one activity write per throttle window.
        if touch_due {
            self.sessions.touch_activity(&mut tx, session.id, now).await?;
        }

        if consume {
            self.sessions.invalidate(&mut tx, session.id).await?;
        }

        tx.commit().await.map_err(DatabaseError::from)?;

        if touch_due {
            self.mark_activity_written(session_key).await;
        }

        Ok(AuthContext { user, session })
    }

    /// Whether the throttle window has elapsed for this session. The cache
    /// is best-effort: on error the write proceeds, costing at most one
    /// redundant UPDATE.
    async fn activity_write_due(&self, session_key: &str) -> bool {
        let key = activity_marker_key(session_key);
        match self.cache.exists(&key).await {
            Ok(exists) => !exists,
            Err(e) => {
                tracing::debug!(error = %e, "activity throttle cache unavailable");
                true
            }
        }
    }

    async fn mark_activity_written(&self, session_key: &str) {
        let key = activity_marker_key(session_key);
        let stamp = Utc::now().to_rfc3339();
        if let Err(e) = self
            .cache
            .set(&key, &stamp, Some(self.activity_throttle_secs))
            .await
        {
            tracing::debug!(error = %e, "failed to set activity throttle marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lms_cache::CacheConfig;
    use lms_database::DatabaseConfig;
    use lms_models::{NewSession, NewUser, UserRole};

    const TEST_SECRET: &str = "test-secret-key-min-32-characters-long";

    async fn setup() -> (Database, AuthGate) {
        let db = Database::new(DatabaseConfig::from_env())
            .await
            .expect("Failed to connect to database");
        let cache = Cache::new(CacheConfig::from_env())
            .await
            .expect("Failed to connect to Redis");
        let jwt = JwtService::new(TEST_SECRET, 60);
        let gate = AuthGate::new(db.clone(), cache, jwt, 300);
        (db, gate)
    }

    async fn seed_user(db: &Database) -> User {
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
    }

    async fn seed_session(db: &Database, user_id: Uuid) -> String {
        let key = JwtService::generate_session_key();
        SessionRepository::new(db.pool().clone())
            .create(&NewSession {
                user_id,
                session_key: key.clone(),
                session_class: "web".to_string(),
                ip_address: None,
                user_agent: None,
                device_type: None,
                login_method: "password".to_string(),
                expires_at: Utc::now() + Duration::days(1),
            })
            .await
            .expect("Failed to create session");
        key
    }

    #[test]
    fn test_session_token_format() {
        // UUID-shaped keys pass.
        assert!(is_well_formed_session_token(
            "550e8400-e29b-41d4-a716-446655440000"
        ));

        // Too short.
        assert!(!is_well_formed_session_token("abc-123"));

        // Disallowed characters.
        assert!(!is_well_formed_session_token(
            "550e8400_e29b_41d4_a716_446655440000"
        ));
        assert!(!is_well_formed_session_token(
            "550e8400-e29b-41d4-a716-44665544000!"
        ));
    }

    #[tokio::test]
    #[ignore] // Only run with Postgres and Redis available
    async fn test_orphaned_token_fails_on_session_not_account() {
        let (db, gate) = setup().await;
        // A real account exists, but the token's jti names no session row.
        // The pipeline must fail on session resolution, not report anything
        // about the account.
        let user = seed_user(&db).await;
        let jwt = JwtService::new(TEST_SECRET, 60);
        let pair = jwt
            .issue_pair(user.id, &JwtService::generate_session_key(), Duration::days(1))
            .unwrap();

        assert!(matches!(
            gate.authenticate_bearer(&pair.access).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    #[ignore] // Only run with Postgres and Redis available
    async fn test_opaque_unknown_key_is_session_not_found() {
        let (_db, gate) = setup().await;
        let key = JwtService::generate_session_key();

        assert!(matches!(
            gate.authenticate_session_token(&key).await,
            Err(AuthError::SessionNotFound)
        ));
    }

    #[tokio::test]
    #[ignore] // Only run with Postgres and Redis available
    async fn test_activity_written_once_per_throttle_window() {
        let (db, gate) = setup().await;
        let user = seed_user(&db).await;
        let key = seed_session(&db, user.id).await;
        let sessions = SessionRepository::new(db.pool().clone());

        gate.authenticate_session_token(&key).await.unwrap();
        let after_first = sessions.list_active_for_user(user.id).await.unwrap()[0].last_activity;

        // Marker is live, so the second request inside the window must not
        // produce another write.
        gate.authenticate_session_token(&key).await.unwrap();
        let after_second = sessions.list_active_for_user(user.id).await.unwrap()[0].last_activity;

        assert_eq!(after_first, after_second);
    }
}
