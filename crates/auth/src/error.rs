use lms_database::DatabaseError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

/// One variant per failure kind so callers handle each explicitly. At the
/// HTTP boundary every authentication-kind variant collapses to the same
/// generic rejection; the kind is only logged server-side.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired or inactive")]
    SessionExpired,

    #[error("Session does not belong to the token's account")]
    BindingMismatch,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account locked until {locked_until}")]
    AccountLocked {
        locked_until: chrono::DateTime<chrono::Utc>,
    },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Revocation failed: {0}")]
    RevocationFailure(String),

    /// Lock-wait timeout or connectivity error. Retryable; never logged as
    /// a security event and never treated as an authentication rejection.
    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    #[error("Cache error: {0}")]
    Cache(#[from] lms_cache::CacheError),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Authentication-kind failures collapse to one opaque "unauthorized"
    /// response at the system boundary.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken(_)
                | AuthError::TokenExpired
                | AuthError::SessionNotFound
                | AuthError::SessionExpired
                | AuthError::BindingMismatch
                | AuthError::AccountNotFound
                | AuthError::AccountInactive
                | AuthError::AccountLocked { .. }
                | AuthError::InvalidCredentials
        )
    }

    /// Safe for the caller to retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::TransientStorage(_))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::MalformedToken(err.to_string()),
        }
    }
}

// NotFound is deliberately absent here: whether a missing row means
// SessionNotFound or AccountNotFound depends on the call site, so those
// sites map it themselves.
impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Timeout(msg) => AuthError::TransientStorage(msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_collapse() {
        assert!(AuthError::SessionNotFound.is_authentication_failure());
        assert!(AuthError::BindingMismatch.is_authentication_failure());
        assert!(AuthError::TokenExpired.is_authentication_failure());
        assert!(!AuthError::TransientStorage("timeout".into()).is_authentication_failure());
        assert!(!AuthError::RevocationFailure("oops".into()).is_authentication_failure());
    }

    #[test]
    fn test_timeout_maps_to_transient() {
        let err: AuthError = DatabaseError::Timeout("lock wait".into()).into();
        assert!(err.is_retryable());
    }
}
