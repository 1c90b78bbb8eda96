use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use gatehouse_auth::{AuthzError, Principal};

use crate::app::errors::ApiError;

/// The authenticated caller, as attached by the auth middleware.
///
/// Rejects with 401 on routes that were not wrapped by it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .map(Self)
            .ok_or_else(|| AuthzError::Unauthenticated.into())
    }
}
