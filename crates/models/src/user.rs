use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,

    pub email: String,
    pub email_verified: bool,

    // NULL for accounts provisioned through an external identity provider
    pub password_hash: Option<String>,

    pub role: UserRole,
    pub is_active: bool,

    // Lockout state lives on the account row so failed-attempt increments
    // and lock checks hit a single row under a single lock.
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account is inside a lockout window at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewUser {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 8))]
    pub password: Option<String>,

    pub role: UserRole,
}

/// Non-sensitive projection returned in login responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            email_verified: user.email_verified,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePassword {
    #[validate(length(min = 8))]
    pub current_password: String,

    #[validate(length(min = 8))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user_with_lock(locked_until: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "student@example.com".to_string(),
            email_verified: true,
            password_hash: None,
            role: UserRole::Student,
            is_active: true,
            failed_login_attempts: 0,
            locked_until,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_locked_at() {
        let now = Utc::now();

        let unlocked = user_with_lock(None);
        assert!(!unlocked.is_locked_at(now));

        let locked = user_with_lock(Some(now + Duration::minutes(15)));
        assert!(locked.is_locked_at(now));

        let expired = user_with_lock(Some(now - Duration::seconds(1)));
        assert!(!expired.is_locked_at(now));
    }
}
