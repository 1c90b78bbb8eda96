use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use gatehouse_core::DomainError;

use crate::app::dto::ApiResponse;
use crate::app::errors::ApiError;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn index() -> ApiResponse<Value> {
    ApiResponse::ok("API is working!", json!({ "message": "Hello, World!" }))
}

pub async fn not_found() -> Response {
    ApiError(DomainError::not_found("Route not found")).into_response()
}
