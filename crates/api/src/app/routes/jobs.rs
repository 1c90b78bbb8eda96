//! Admin views over the background job system.

use std::sync::Arc;

use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};

use gatehouse_infra::jobs::{DeadLetterRecord, DeadLetterStore, JobStats, job_stats};

use crate::app::dto::{ApiResponse, DeadLetterQuery, ValidatedQuery};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{ADMIN_ONLY, require_roles};
use crate::middleware::{AuthState, auth_middleware};

pub fn router(auth: AuthState) -> Router {
    Router::new()
        .route("/dead-letters", get(dead_letters))
        .route("/stats", get(stats))
        .route_layer(from_fn_with_state(ADMIN_ONLY, require_roles))
        .route_layer(from_fn_with_state(auth, auth_middleware))
}

async fn dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    ValidatedQuery(query): ValidatedQuery<DeadLetterQuery>,
) -> Result<ApiResponse<Vec<DeadLetterRecord>>, ApiError> {
    let records = services.dead_letters.list(query.resolve())?;
    Ok(ApiResponse::ok("Dead letters retrieved successfully.", records))
}

async fn stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<ApiResponse<JobStats>, ApiError> {
    let stats = job_stats(services.jobs.store().as_ref(), services.dead_letters.as_ref())?;
    Ok(ApiResponse::ok("Job stats retrieved successfully.", stats))
}
