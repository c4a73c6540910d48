// Session-bound authentication core: token issuance and validation bound to
// server-side session rows, escalating account lockout, and bulk/targeted
// revocation.
pub mod config;
pub mod error;
pub mod gate;
pub mod jwt;
pub mod lockout;
pub mod password;
pub mod revocation;
pub mod service;

pub use config::{AuthConfig, LockoutPolicy, SessionLifetimes};
pub use error::{AuthError, Result};
pub use gate::{AuthContext, AuthGate};
pub use jwt::{Claims, JwtService, SessionClass, TokenPair, TokenType};
pub use lockout::{AccountLockoutService, AttemptContext};
pub use password::PasswordHasher;
pub use revocation::SessionRevocationService;
pub use service::{AuthService, LoginRequest, LoginResponse, RefreshTokenRequest};
