use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Lock-wait or statement timeout, or a connectivity failure. Callers
    /// treat this as retryable, never as an authentication rejection.
    #[error("Transient storage error: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("Database error: {0}")]
    Other(String),
}

// Postgres codes: 57014 = query_canceled (statement_timeout),
// 55P03 = lock_not_available.
const PG_QUERY_CANCELED: &str = "57014";
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    return DatabaseError::DuplicateKey(db_err.message().to_string());
                }
                if let Some(code) = db_err.code() {
                    if code == PG_QUERY_CANCELED || code == PG_LOCK_NOT_AVAILABLE {
                        return DatabaseError::Timeout(db_err.message().to_string());
                    }
                }
                DatabaseError::Sqlx(err)
            }
            sqlx::Error::PoolTimedOut => {
                DatabaseError::Timeout("connection pool acquire timed out".to_string())
            }
            sqlx::Error::Io(_) => DatabaseError::Timeout(err.to_string()),
            sqlx::Error::RowNotFound => DatabaseError::NotFound("row not found".to_string()),
            _ => DatabaseError::Sqlx(err),
        }
    }
}

impl DatabaseError {
    /// Whether the caller may safely retry the failed unit of work.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::Timeout(_))
    }
}
