//! Route-level role gate.
//!
//! Runs after [`auth_middleware`](crate::middleware::auth_middleware), so a
//! missing principal means the route was wired without authentication.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use gatehouse_auth::{Principal, Role, require_role};

use crate::app::errors::ApiError;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

/// Let the request through only if the caller's role is in the allowed set.
///
/// Wire with `from_fn_with_state(ADMIN_ONLY, require_roles)`.
pub async fn require_roles(
    State(allowed): State<&'static [Role]>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    require_role(req.extensions().get::<Principal>(), allowed)?;
    Ok(next.run(req).await)
}
