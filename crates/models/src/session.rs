use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Server-side session row. `session_key` equals the `jti` claim of the
/// token pair issued for it and is the trust anchor binding bearer tokens
/// to revocable state: a cryptographically valid token is useless once the
/// row is inactive or expired.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,

    // Globally unique, immutable after creation
    pub session_key: String,

    // Class requested at login ("web" / "mobile" / "api"); fixed for the
    // session's lifetime and carried across refresh rotation
    pub session_class: String,

    // Descriptive context captured at login
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub login_method: String,

    // Terminal once false
    pub is_active: bool,

    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// A session is valid iff it is still active and not past expiry.
    /// Pure function of row state and the supplied clock.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now <= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
    pub session_key: String,
    pub session_class: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub login_method: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(is_active: bool, expires_at: DateTime<Utc>) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            session_key: Uuid::new_v4().to_string(),
            session_class: "web".to_string(),
            ip_address: None,
            user_agent: None,
            device_type: None,
            login_method: "password".to_string(),
            is_active,
            last_activity: now,
            expires_at,
            created_at: now,
        }
    }

    #[test]
    fn test_active_unexpired_session_is_valid() {
        let now = Utc::now();
        let s = session(true, now + Duration::hours(24));
        assert!(s.is_valid(now));
    }

    #[test]
    fn test_inactive_session_is_invalid_regardless_of_expiry() {
        let now = Utc::now();
        let s = session(false, now + Duration::hours(24));
        assert!(!s.is_valid(now));
    }

    #[test]
    fn test_expired_session_is_invalid_even_when_active() {
        let now = Utc::now();
        let s = session(true, now - Duration::seconds(1));
        assert!(!s.is_valid(now));
    }
}
