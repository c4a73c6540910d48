use crate::config::SessionLifetimes;
use crate::error::{AuthError, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Session key: the token is only usable while the session row this
    /// names is valid
    pub jti: String,
    pub token_type: TokenType,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Session class requested at login; drives the backing session's TTL.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionClass {
    #[default]
    Web,
    Mobile,
    Api,
}

impl SessionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionClass::Web => "web",
            SessionClass::Mobile => "mobile",
            SessionClass::Api => "api",
        }
    }

    /// Inverse of `as_str`; used to recover the class stored on a session
    /// row. None for anything unrecognized.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web" => Some(SessionClass::Web),
            "mobile" => Some(SessionClass::Mobile),
            "api" => Some(SessionClass::Api),
            _ => None,
        }
    }

    pub fn session_ttl(&self, lifetimes: &SessionLifetimes) -> Duration {
        match self {
            SessionClass::Web => Duration::days(lifetimes.web_days),
            SessionClass::Mobile => Duration::days(lifetimes.mobile_days),
            SessionClass::Api => Duration::days(lifetimes.api_days),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_token_minutes: i64,
}

impl JwtService {
    /// `secret` must be the dedicated session-token key, never a secret
    /// shared with unrelated signing duties.
    pub fn new(secret: &str, access_token_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm: Algorithm::HS256,
            access_token_minutes,
        }
    }

    /// Generate a fresh session key. Used as the `jti` of both tokens in a
    /// pair and as the key of the backing session row.
    pub fn generate_session_key() -> String {
        Uuid::new_v4().to_string()
    }

    /// Mint an access/refresh pair bound to `session_key`. The refresh
    /// token lives as long as the session; the access token is short-lived
    /// and capped by the session TTL.
    pub fn issue_pair(
        &self,
        user_id: Uuid,
        session_key: &str,
        session_ttl: Duration,
    ) -> Result<TokenPair> {
        let now = Utc::now();
        let access_ttl = Duration::minutes(self.access_token_minutes).min(session_ttl);

        let access = self.encode_claims(user_id, session_key, now, access_ttl, TokenType::Access)?;
        let refresh =
            self.encode_claims(user_id, session_key, now, session_ttl, TokenType::Refresh)?;

        Ok(TokenPair { access, refresh })
    }

    fn encode_claims(
        &self,
        user_id: Uuid,
        session_key: &str,
        now: DateTime<Utc>,
        ttl: Duration,
        token_type: TokenType,
    ) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            jti: session_key.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify signature and expiry and decode the claims. No session or
    /// account state is touched here; this step can never block.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(self.algorithm);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        let claims = token_data.claims;
        if claims.jti.trim().is_empty() {
            // A token without a session binding is never a standalone
            // trust anchor.
            return Err(AuthError::MalformedToken("missing jti claim".to_string()));
        }

        Ok(claims)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::MalformedToken(
                "token is not an access token".to_string(),
            ));
        }

        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::MalformedToken(
                "token is not a refresh token".to_string(),
            ));
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("test-secret-key-min-32-characters-long", 60)
    }

    #[test]
    fn test_issue_and_validate_pair() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let session_key = JwtService::generate_session_key();

        let pair = jwt
            .issue_pair(user_id, &session_key, Duration::days(14))
            .expect("Failed to issue pair");

        let access = jwt.validate_access_token(&pair.access).unwrap();
        let refresh = jwt.validate_refresh_token(&pair.refresh).unwrap();

        assert_eq!(access.sub, user_id.to_string());
        assert_eq!(access.jti, session_key);
        assert_eq!(refresh.jti, session_key);
        assert_eq!(access.token_type, TokenType::Access);
        assert_eq!(refresh.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_wrong_token_type_rejected() {
        let jwt = service();
        let pair = jwt
            .issue_pair(
                Uuid::new_v4(),
                &JwtService::generate_session_key(),
                Duration::days(14),
            )
            .unwrap();

        assert!(matches!(
            jwt.validate_access_token(&pair.refresh),
            Err(AuthError::MalformedToken(_))
        ));
        assert!(matches!(
            jwt.validate_refresh_token(&pair.access),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let jwt = service();
        let pair = jwt
            .issue_pair(
                Uuid::new_v4(),
                &JwtService::generate_session_key(),
                Duration::days(14),
            )
            .unwrap();

        let other = JwtService::new("a-completely-different-signing-key-here", 60);
        assert!(matches!(
            other.validate_access_token(&pair.access),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_empty_jti_rejected() {
        let jwt = service();
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            jti: "".to_string(),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("test-secret-key-min-32-characters-long".as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            jwt.validate_access_token(&token),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let jwt = service();
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            jti: JwtService::generate_session_key(),
            token_type: TokenType::Access,
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret("test-secret-key-min-32-characters-long".as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            jwt.validate_access_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_session_class_roundtrips_through_storage_form() {
        for class in [SessionClass::Web, SessionClass::Mobile, SessionClass::Api] {
            assert_eq!(SessionClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(SessionClass::parse("desktop"), None);
        assert_eq!(SessionClass::parse(""), None);
    }

    #[test]
    fn test_access_ttl_capped_by_session_ttl() {
        let jwt = service();
        // A 10-minute session must not produce a 60-minute access token.
        let pair = jwt
            .issue_pair(
                Uuid::new_v4(),
                &JwtService::generate_session_key(),
                Duration::minutes(10),
            )
            .unwrap();

        let claims = jwt.validate_access_token(&pair.access).unwrap();
        assert!(claims.exp - claims.iat <= 10 * 60);
    }
}
