pub mod login_attempts;
pub mod sessions;
pub mod users;
