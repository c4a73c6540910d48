use chrono::Duration;

/// Escalating lockout policy. Thresholds and durations are configuration,
/// not hardcoded business rules.
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    /// Failures at which the short lock kicks in
    pub soft_threshold: i32,
    /// Failures at which the lock escalates
    pub hard_threshold: i32,
    pub soft_lock_minutes: i64,
    pub hard_lock_hours: i64,
    /// Counter increments past this value are rejected so the stored
    /// counter can never wrap its storage width.
    pub attempt_ceiling: i32,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            soft_threshold: 5,
            hard_threshold: 10,
            soft_lock_minutes: 15,
            hard_lock_hours: 24,
            attempt_ceiling: 10_000,
        }
    }
}

impl LockoutPolicy {
    /// Lock duration the given failure count earns, if any. Checked against
    /// the counter value *after* the atomic increment.
    pub fn lock_duration_for(&self, failed_attempts: i32) -> Option<Duration> {
        if failed_attempts >= self.hard_threshold {
            Some(Duration::hours(self.hard_lock_hours))
        } else if failed_attempts >= self.soft_threshold {
            Some(Duration::minutes(self.soft_lock_minutes))
        } else {
            None
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            soft_threshold: env_parse("LOCKOUT_SOFT_THRESHOLD", defaults.soft_threshold),
            hard_threshold: env_parse("LOCKOUT_HARD_THRESHOLD", defaults.hard_threshold),
            soft_lock_minutes: env_parse("LOCKOUT_SOFT_MINUTES", defaults.soft_lock_minutes),
            hard_lock_hours: env_parse("LOCKOUT_HARD_HOURS", defaults.hard_lock_hours),
            attempt_ceiling: env_parse("LOCKOUT_ATTEMPT_CEILING", defaults.attempt_ceiling),
        }
    }
}

/// Default session lifetimes per session class.
#[derive(Debug, Clone)]
pub struct SessionLifetimes {
    pub web_days: i64,
    pub mobile_days: i64,
    pub api_days: i64,
    /// Access tokens are short-lived; the session (and refresh token)
    /// carries the class lifetime.
    pub access_token_minutes: i64,
}

impl Default for SessionLifetimes {
    fn default() -> Self {
        Self {
            web_days: 14,
            mobile_days: 30,
            api_days: 365,
            access_token_minutes: 60,
        }
    }
}

impl SessionLifetimes {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            web_days: env_parse("SESSION_WEB_DAYS", defaults.web_days),
            mobile_days: env_parse("SESSION_MOBILE_DAYS", defaults.mobile_days),
            api_days: env_parse("SESSION_API_DAYS", defaults.api_days),
            access_token_minutes: env_parse(
                "ACCESS_TOKEN_MINUTES",
                defaults.access_token_minutes,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Dedicated signing key for session tokens. Deliberately a separate
    /// variable from any general application secret.
    pub jwt_secret: String,
    pub lifetimes: SessionLifetimes,
    pub lockout: LockoutPolicy,
    /// Hard cap on session extension requests; larger requests are clamped,
    /// never rejected.
    pub max_extension_hours: i64,
    /// Window during which repeated activity on a session produces a single
    /// last_activity write.
    pub activity_throttle_secs: u64,
    pub cleanup_batch_size: i64,
    pub cleanup_batch_pause_ms: u64,
    pub attempt_log_retention_days: i32,
    /// Soft limit; exceeding it only logs a warning.
    pub max_concurrent_sessions: i64,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            jwt_secret: std::env::var("AUTH_JWT_SECRET").expect("AUTH_JWT_SECRET must be set"),
            lifetimes: SessionLifetimes::from_env(),
            lockout: LockoutPolicy::from_env(),
            max_extension_hours: env_parse("SESSION_MAX_EXTENSION_HOURS", 168),
            activity_throttle_secs: env_parse("ACTIVITY_THROTTLE_SECS", 300),
            cleanup_batch_size: env_parse("SESSION_CLEANUP_BATCH_SIZE", 500),
            cleanup_batch_pause_ms: env_parse("SESSION_CLEANUP_BATCH_PAUSE_MS", 100),
            attempt_log_retention_days: env_parse("ATTEMPT_LOG_RETENTION_DAYS", 90),
            max_concurrent_sessions: env_parse("MAX_CONCURRENT_SESSIONS", 10),
        }
    }

    /// Test/dev constructor with defaults and an explicit secret.
    pub fn with_secret(secret: &str) -> Self {
        Self {
            jwt_secret: secret.to_string(),
            lifetimes: SessionLifetimes::default(),
            lockout: LockoutPolicy::default(),
            max_extension_hours: 168,
            activity_throttle_secs: 300,
            cleanup_batch_size: 500,
            cleanup_batch_pause_ms: 100,
            attempt_log_retention_days: 90,
            max_concurrent_sessions: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_escalation_thresholds() {
        let policy = LockoutPolicy::default();

        assert_eq!(policy.lock_duration_for(4), None);
        assert_eq!(policy.lock_duration_for(5), Some(Duration::minutes(15)));
        assert_eq!(policy.lock_duration_for(9), Some(Duration::minutes(15)));
        assert_eq!(policy.lock_duration_for(10), Some(Duration::hours(24)));
        assert_eq!(policy.lock_duration_for(250), Some(Duration::hours(24)));
    }

    #[test]
    fn test_soft_lock_window_bounds() {
        // 5th failure at T: locked at T+10min, clear by T+16min.
        let policy = LockoutPolicy::default();
        let t = chrono::Utc::now();
        let locked_until = t + policy.lock_duration_for(5).unwrap();

        assert!(t + Duration::minutes(10) < locked_until);
        assert!(t + Duration::minutes(16) > locked_until);
    }
}
