//! Third-party identity (OAuth) contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gatehouse_core::DomainError;

/// Identity asserted by an OAuth provider after a successful consent flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProfile {
    pub email: Option<String>,
    pub display_name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("authorization code exchange failed: {0}")]
    Exchange(String),

    #[error("profile lookup failed: {0}")]
    Profile(String),
}

impl From<OAuthError> for DomainError {
    fn from(_: OAuthError) -> Self {
        DomainError::unauthorized("OAuth authentication failed.")
    }
}

/// An OAuth 2.0 authorization-code provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Where to send the user to grant consent.
    fn authorization_url(&self) -> String;

    /// Exchange the callback `code` and resolve the user's profile.
    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, OAuthError>;
}
