use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use gatehouse_auth::{AuthzError, OAuthError, TokenError};
use gatehouse_core::{DomainError, FieldError};
use gatehouse_infra::jobs::JobStoreError;

const INTERNAL_MESSAGE: &str = "Something went wrong";

/// HTTP-facing wrapper around [`DomainError`].
///
/// Handlers return `Result<_, ApiError>` and use `?` on anything that
/// converts into a `DomainError`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DomainError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self(DomainError::validation(message, details))
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(value)
    }
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        Self(value.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(value: TokenError) -> Self {
        Self(value.into())
    }
}

impl From<OAuthError> for ApiError {
    fn from(value: OAuthError) -> Self {
        Self(value.into())
    }
}

impl From<JobStoreError> for ApiError {
    fn from(value: JobStoreError) -> Self {
        Self(value.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();
        match self.0 {
            DomainError::Validation { message, details } => {
                json_error(status, kind, message, Some(&details))
            }
            DomainError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json_error(status, kind, INTERNAL_MESSAGE, None)
            }
            DomainError::Unauthorized(message)
            | DomainError::Forbidden(message)
            | DomainError::NotFound(message)
            | DomainError::Conflict(message) => json_error(status, kind, message, None),
        }
    }
}

/// Error envelope: `{success:false, status, error, message[, details]}`.
pub fn json_error(
    status: StatusCode,
    kind: &'static str,
    message: impl Into<String>,
    details: Option<&[FieldError]>,
) -> Response {
    let mut body = json!({
        "success": false,
        "status": status.as_u16(),
        "error": kind,
        "message": message.into(),
    });
    if let Some(details) = details {
        body["details"] = json!(details);
    }
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn each_kind_maps_to_its_status() {
        let cases = [
            (DomainError::validation("v", vec![]), 422),
            (DomainError::unauthorized("u"), 401),
            (DomainError::forbidden("f"), 403),
            (DomainError::not_found("n"), 404),
            (DomainError::conflict("c"), 409),
            (DomainError::internal("i"), 500),
        ];
        for (err, expected) in cases {
            let kind = err.kind();
            let (status, body) = body_of(ApiError(err)).await;
            assert_eq!(status.as_u16(), expected);
            assert_eq!(body["status"], expected);
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], kind);
        }
    }

    #[tokio::test]
    async fn internal_detail_is_not_exposed() {
        let (_, body) = body_of(ApiError(DomainError::internal("pool timed out at 10.0.0.4"))).await;
        assert_eq!(body["message"], "Something went wrong");
        assert!(!body.to_string().contains("10.0.0.4"));
    }

    #[tokio::test]
    async fn validation_errors_carry_field_details() {
        let err = ApiError::validation(
            "Validation Error",
            vec![FieldError::new("email", "Invalid email address")],
        );
        let (_, body) = body_of(err).await;
        assert_eq!(body["message"], "Validation Error");
        assert_eq!(body["details"][0]["field"], "email");
        assert_eq!(body["details"][0]["message"], "Invalid email address");
    }

    #[tokio::test]
    async fn non_validation_errors_have_no_details() {
        let (_, body) = body_of(ApiError(DomainError::conflict("User already exists."))).await;
        assert!(body.get("details").is_none());
        assert_eq!(body["message"], "User already exists.");
    }
}
