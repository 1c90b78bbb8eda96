use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use gatehouse_auth::{Principal, TokenIssuer};
use gatehouse_core::DomainError;

use crate::app::errors::ApiError;

const NO_TOKEN: &str = "No token provided";

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<dyn TokenIssuer>,
}

/// Verify the bearer access token and attach the caller's [`Principal`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers()).ok_or_else(|| DomainError::unauthorized(NO_TOKEN))?;

    let claims = state.tokens.verify_access(token)?;

    req.extensions_mut().insert(Principal::from(&claims));

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// One `info` event per request. Headers and bodies are never recorded.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}
