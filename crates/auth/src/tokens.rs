//! Access/refresh token issuance and verification (HS256 JWT).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::DomainError;

use crate::{AccessClaims, RefreshClaims, TokenType, User};

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(604_800);

/// The message used for every token rejection, whatever the cause.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("token encoding failed: {0}")]
    Encode(String),

    #[error("invalid token configuration: {0}")]
    Config(String),
}

impl From<TokenError> for DomainError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Expired | TokenError::Invalid(_) => {
                DomainError::unauthorized(INVALID_TOKEN_MESSAGE)
            }
            TokenError::Encode(msg) | TokenError::Config(msg) => DomainError::internal(msg),
        }
    }
}

/// Both tokens returned by a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Creates and validates signed, expiring tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue_access(&self, user: &User) -> Result<String, TokenError>;

    fn issue_refresh(&self, user: &User) -> Result<String, TokenError>;

    fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError>;

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError>;

    fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access(user)?,
            refresh_token: self.issue_refresh(user)?,
        })
    }
}

/// Secrets and lifetimes for the two token kinds.
#[derive(Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

impl core::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"***")
            .field("refresh_secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// HS256 issuer with distinct access and refresh secrets.
pub struct JwtTokenIssuer {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl JwtTokenIssuer {
    /// Build an issuer. Both secrets must be non-empty and distinct.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        if config.access_secret.is_empty() {
            return Err(TokenError::Config("access secret must not be empty".into()));
        }
        if config.refresh_secret.is_empty() {
            return Err(TokenError::Config("refresh secret must not be empty".into()));
        }
        if config.access_secret == config.refresh_secret {
            return Err(TokenError::Config(
                "access and refresh secrets must differ".into(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            validation,
        })
    }

    fn window(ttl: Duration) -> (i64, i64) {
        let iat = Utc::now().timestamp();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        (iat, iat.saturating_add(ttl))
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid(err.to_string()),
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue_access(&self, user: &User) -> Result<String, TokenError> {
        let (iat, exp) = Self::window(self.access_ttl);
        let claims = AccessClaims {
            sub: user.id,
            role: user.role,
            iat,
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    fn issue_refresh(&self, user: &User) -> Result<String, TokenError> {
        let (iat, exp) = Self::window(self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user.id,
            token_type: TokenType::Refresh,
            iat,
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }

    fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh_decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use crate::testing::sample_user;

    fn issuer() -> JwtTokenIssuer {
        JwtTokenIssuer::new(TokenConfig::new("access-secret", "refresh-secret")).unwrap()
    }

    #[test]
    fn access_token_carries_identity_and_role() {
        let user = sample_user("alice@example.com", Role::Admin);
        let issuer = issuer();

        let token = issuer.issue_access(&user).unwrap();
        let claims = issuer.verify_access(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn refresh_token_has_type_marker_and_long_expiry() {
        let user = sample_user("alice@example.com", Role::User);
        let issuer = issuer();

        let token = issuer.issue_refresh(&user).unwrap();
        let claims = issuer.verify_refresh(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp - claims.iat, 604_800);
    }

    #[test]
    fn refresh_token_is_rejected_as_access_token_and_vice_versa() {
        let user = sample_user("alice@example.com", Role::User);
        let issuer = issuer();
        let pair = issuer.issue_pair(&user).unwrap();

        assert!(matches!(
            issuer.verify_access(&pair.refresh_token),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(
            issuer.verify_refresh(&pair.access_token),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let user = sample_user("alice@example.com", Role::User);
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user.id,
            role: Role::User,
            iat: now - 120,
            exp: now - 60,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        let err = issuer().verify_access(&token).unwrap_err();
        assert_eq!(err, TokenError::Expired);
        assert_eq!(
            DomainError::from(err),
            DomainError::unauthorized(INVALID_TOKEN_MESSAGE)
        );
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let user = sample_user("alice@example.com", Role::Admin);
        let other = JwtTokenIssuer::new(TokenConfig::new("other", "other-refresh")).unwrap();
        let forged = other.issue_access(&user).unwrap();

        assert!(matches!(
            issuer().verify_access(&forged),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(issuer().verify_access("not.a.jwt").is_err());
        assert!(issuer().verify_access("").is_err());
    }

    #[test]
    fn configuration_requires_distinct_non_empty_secrets() {
        assert!(matches!(
            JwtTokenIssuer::new(TokenConfig::new("", "x")),
            Err(TokenError::Config(_))
        ));
        assert!(matches!(
            JwtTokenIssuer::new(TokenConfig::new("x", "")),
            Err(TokenError::Config(_))
        ));
        assert!(matches!(
            JwtTokenIssuer::new(TokenConfig::new("same", "same")),
            Err(TokenError::Config(_))
        ));
    }

    #[test]
    fn custom_ttls_are_applied() {
        let user = sample_user("alice@example.com", Role::User);
        let issuer = JwtTokenIssuer::new(
            TokenConfig::new("a", "b")
                .with_access_ttl(Duration::from_secs(60))
                .with_refresh_ttl(Duration::from_secs(120)),
        )
        .unwrap();

        let access = issuer.verify_access(&issuer.issue_access(&user).unwrap()).unwrap();
        let refresh = issuer.verify_refresh(&issuer.issue_refresh(&user).unwrap()).unwrap();
        assert_eq!(access.exp - access.iat, 60);
        assert_eq!(refresh.exp - refresh.iat, 120);
    }
}
