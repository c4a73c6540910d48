use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only audit record written for every login attempt, successful or
/// not. Rows are pruned on a fixed retention window by the cleanup loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoginAttempt {
    // None when the email did not resolve to an account
    pub user_id: Option<Uuid>,
    pub email: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub successful: bool,
    pub failure_reason: Option<String>,
}
