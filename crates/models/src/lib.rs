// Core data types shared across the LMS backend crates.
pub mod login_attempt;
pub mod session;
pub mod user;

// Re-export commonly used types
pub use login_attempt::NewLoginAttempt;
pub use session::{NewSession, Session};
pub use user::{ChangePassword, NewUser, User, UserProfile, UserRole};
