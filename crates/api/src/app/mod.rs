//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: backend selection and service construction
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs, validation and the success envelope
//! - `errors.rs`: the error envelope

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub use services::{AppServices, build_services};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        tokens: services.tokens.clone(),
    };
    let oauth_enabled = services.oauth.is_some();

    Router::new()
        .route("/", get(routes::system::index))
        .route("/health", get(routes::system::health))
        .route("/api", get(routes::system::index))
        .route("/api/", get(routes::system::index))
        .nest("/api/users", routes::users::router(auth_state.clone(), oauth_enabled))
        .nest("/api/jobs", routes::jobs::router(auth_state))
        .fallback(routes::system::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_logger))
                .layer(Extension(services)),
        )
}
