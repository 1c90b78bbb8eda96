//! Error taxonomy shared by the service layer and the HTTP boundary.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the service layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Typed failure raised by services and mapped to a status code at the edge.
///
/// Services never format responses or log; they only pick the kind and a
/// user-safe message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input.
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    /// Missing or invalid credentials/token, or no authenticated identity.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but the role is not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// Unexpected or unclassified failure. The message is internal detail
    /// and must not be shown to callers.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self::Validation {
            message: "Invalid identifier".to_string(),
            details: vec![FieldError::new("id", msg)],
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable kind name, used as the `error` field of the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Validation { .. } => "ValidationError",
            DomainError::Unauthorized(_) => "UnauthorizedError",
            DomainError::Forbidden(_) => "ForbiddenError",
            DomainError::NotFound(_) => "NotFoundError",
            DomainError::Conflict(_) => "ConflictError",
            DomainError::Internal(_) => "InternalServerError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_the_wire_taxonomy() {
        assert_eq!(DomainError::conflict("x").kind(), "ConflictError");
        assert_eq!(DomainError::unauthorized("x").kind(), "UnauthorizedError");
        assert_eq!(DomainError::forbidden("x").kind(), "ForbiddenError");
        assert_eq!(DomainError::not_found("x").kind(), "NotFoundError");
        assert_eq!(DomainError::validation("x", vec![]).kind(), "ValidationError");
        assert_eq!(DomainError::internal("x").kind(), "InternalServerError");
    }

    #[test]
    fn display_is_the_user_facing_message() {
        assert_eq!(
            DomainError::unauthorized("Invalid email or password.").to_string(),
            "Invalid email or password."
        );
    }
}
