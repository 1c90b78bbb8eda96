//! Google sign-in. Mounted under `/api/users` only when OAuth is configured.

use std::sync::Arc;

use axum::{
    Extension, Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use gatehouse_auth::{OAuthError, OAuthProvider, TokenPair};
use gatehouse_core::{DomainError, DomainResult, FieldError};

use crate::app::dto::{ApiResponse, ValidatedQuery, Validate};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/auth/google", get(start))
        .route("/auth/google/callback", get(callback))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    /// Set by the provider when the user declines consent.
    #[serde(default)]
    pub error: Option<String>,
}

impl Validate for CallbackQuery {
    fn validate(&self) -> DomainResult<()> {
        let has_code = self.code.as_deref().is_some_and(|c| !c.is_empty());
        if has_code || self.error.is_some() {
            return Ok(());
        }
        Err(DomainError::validation(
            "Validation Error",
            vec![FieldError::new("code", "Required")],
        ))
    }
}

fn provider(services: &AppServices) -> Result<&Arc<dyn OAuthProvider>, ApiError> {
    services
        .oauth
        .as_ref()
        .ok_or_else(|| ApiError(DomainError::not_found("Route not found")))
}

async fn start(Extension(services): Extension<Arc<AppServices>>) -> Result<Response, ApiError> {
    let url = provider(&services)?.authorization_url();
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

async fn callback(
    Extension(services): Extension<Arc<AppServices>>,
    ValidatedQuery(query): ValidatedQuery<CallbackQuery>,
) -> Result<ApiResponse<TokenPair>, ApiError> {
    let provider = provider(&services)?;

    if let Some(reason) = query.error {
        tracing::warn!(%reason, "google consent not granted");
        return Err(OAuthError::Exchange(reason).into());
    }
    let code = query.code.unwrap_or_default();

    let profile = provider.exchange_code(&code).await.inspect_err(|e| {
        tracing::warn!(error = %e, "google sign-in failed");
    })?;
    let tokens = services.auth.sign_in_with_oauth(profile).await?;
    Ok(ApiResponse::ok("Login successful.", tokens))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_needs_a_code_or_a_provider_error() {
        assert!(CallbackQuery::default().validate().is_err());
        assert!(
            CallbackQuery {
                code: Some("abc".into()),
                error: None
            }
            .validate()
            .is_ok()
        );
        assert!(
            CallbackQuery {
                code: None,
                error: Some("access_denied".into())
            }
            .validate()
            .is_ok()
        );
    }
}
