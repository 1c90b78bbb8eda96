//! Google OAuth 2.0 authorization-code client.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use gatehouse_auth::{OAuthError, OAuthProfile, OAuthProvider};

use crate::config::GoogleConfig;

const SCOPES: &str = "profile email";

/// Google endpoints. Overridable so tests can stand in a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
}

pub struct GoogleOAuthProvider {
    client: reqwest::Client,
    config: GoogleConfig,
    consent_url: String,
}

impl GoogleOAuthProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, OAuthError> {
        let consent_url = Url::parse_with_params(
            &config.endpoints.auth_url,
            &[
                ("client_id", config.client_id.as_str()),
                ("redirect_uri", config.callback_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
            ],
        )
        .map_err(|e| OAuthError::Exchange(format!("invalid authorization url: {e}")))?
        .to_string();

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            consent_url,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn authorization_url(&self) -> String {
        self.consent_url.clone()
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthProfile, OAuthError> {
        let resp = self
            .client
            .post(&self.config.endpoints.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OAuthError::Exchange(format!("token endpoint returned {}", resp.status())));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let resp = self
            .client
            .get(&self.config.endpoints.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OAuthError::Profile(format!("userinfo endpoint returned {}", resp.status())));
        }
        let info: UserInfo = resp
            .json()
            .await
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        Ok(OAuthProfile {
            email: info.email,
            display_name: info.name.unwrap_or_default(),
        })
    }
}
