use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::Path,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};

use gatehouse_auth::{TokenPair, UserSummary, UserView};
use gatehouse_core::{FieldError, UserId};

use crate::app::dto::{
    ApiResponse, PaginatedUsers, PaginationQuery, SignInRequest, SignUpRequest,
    UpdateProfileRequest, UpdateRoleRequest, ValidatedJson, ValidatedQuery,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{ADMIN_ONLY, require_roles};
use crate::context::CurrentPrincipal;
use crate::middleware::{AuthState, auth_middleware};

use super::oauth;

pub fn router(auth: AuthState, oauth_enabled: bool) -> Router {
    let authenticated = Router::new()
        .route("/update", patch(update_profile))
        .route_layer(from_fn_with_state(auth.clone(), auth_middleware));

    // The last layer runs first: authentication, then the role gate.
    let admin = Router::new()
        .route("/role/:id", patch(update_role))
        .route("/users", get(list_users))
        .route("/paginated", get(list_users_paginated))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(from_fn_with_state(auth, auth_middleware));

    let router = Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .merge(authenticated)
        .merge(admin);

    if oauth_enabled {
        router.merge(oauth::router())
    } else {
        router
    }
}

async fn sign_up(
    Extension(services): Extension<Arc<AppServices>>,
    ValidatedJson(req): ValidatedJson<SignUpRequest>,
) -> Result<ApiResponse<UserView>, ApiError> {
    let user = services.auth.sign_up(req.into()).await?;
    Ok(ApiResponse::created("User registered successfully.", user.into()))
}

async fn sign_in(
    Extension(services): Extension<Arc<AppServices>>,
    ValidatedJson(req): ValidatedJson<SignInRequest>,
) -> Result<ApiResponse<TokenPair>, ApiError> {
    let tokens = services.auth.sign_in(req.into()).await?;
    Ok(ApiResponse::ok("Login successful.", tokens))
}

async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> Result<ApiResponse<UserView>, ApiError> {
    let user = services
        .auth
        .update_name_or_password(principal.user_id, req.into())
        .await?;
    Ok(ApiResponse::ok("Profile updated successfully.", user.into()))
}

async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateRoleRequest>,
) -> Result<ApiResponse<UserView>, ApiError> {
    let user_id = UserId::from_str(&id).map_err(|_| {
        ApiError::validation(
            "Validation Error",
            vec![FieldError::new("id", "Invalid user id")],
        )
    })?;
    let role = req.role()?;
    let user = services.auth.update_role(user_id, role).await?;
    Ok(ApiResponse::ok("User role updated successfully.", user.into()))
}

async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<ApiResponse<Vec<UserSummary>>, ApiError> {
    let users = services.auth.get_all_users().await?;
    Ok(ApiResponse::ok("Users retrieved successfully.", users))
}

async fn list_users_paginated(
    Extension(services): Extension<Arc<AppServices>>,
    ValidatedQuery(query): ValidatedQuery<PaginationQuery>,
) -> Result<ApiResponse<PaginatedUsers>, ApiError> {
    let (page, limit) = query.resolve();
    let result = services.auth.get_users_paginated(page, limit).await?;
    Ok(ApiResponse::ok(
        "Paginated users retrieved successfully.",
        PaginatedUsers {
            users: result.items,
            page,
            limit,
            total: result.total,
        },
    ))
}
