use serde::{Deserialize, Serialize};

use gatehouse_core::UserId;

use crate::Role;

/// Claims carried by an access token.
///
/// Unknown fields are rejected so that a refresh token payload can never be
/// read as an access token, independent of the signing secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessClaims {
    /// Subject (user identifier).
    pub sub: UserId,

    /// Role at issuance time.
    pub role: Role,

    /// Issued-at, seconds since the epoch.
    pub iat: i64,

    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Marker distinguishing refresh tokens from access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Refresh,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,

    #[serde(rename = "tokenType")]
    pub token_type: TokenType,

    pub iat: i64,
    pub exp: i64,
}
