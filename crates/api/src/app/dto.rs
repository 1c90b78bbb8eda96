//! Request DTOs, input validation and the success envelope.

use std::str::FromStr;
use std::sync::OnceLock;

use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::{Json, async_trait};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gatehouse_auth::{Role, SignInInput, SignUpInput, UpdateProfileInput, UserSummary};
use gatehouse_core::{DomainError, DomainResult, FieldError};

use super::errors::ApiError;

const VALIDATION_MESSAGE: &str = "Validation Error";
const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern compiles")
    })
}

/// Request payloads that check themselves before reaching a service.
pub trait Validate {
    fn validate(&self) -> DomainResult<()>;
}

/// Collects every field problem of one payload.
#[derive(Default)]
struct Violations(Vec<FieldError>);

impl Violations {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn required<'a>(&mut self, field: &str, value: &'a Option<String>) -> Option<&'a str> {
        if value.is_none() {
            self.push(field, "Required");
        }
        value.as_deref()
    }

    fn min_len(&mut self, field: &str, value: &str, min: usize) {
        if value.chars().count() < min {
            self.push(field, format!("String must contain at least {min} character(s)"));
        }
    }

    fn email(&mut self, field: &str, value: &str) {
        if !email_regex().is_match(value) {
            self.push(field, "Invalid email");
        }
    }

    fn finish(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(VALIDATION_MESSAGE, self.0))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Validate for SignUpRequest {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        if let Some(name) = v.required("name", &self.name) {
            v.min_len("name", name, 1);
        }
        if let Some(email) = v.required("email", &self.email) {
            v.email("email", email);
        }
        if let Some(password) = v.required("password", &self.password) {
            v.min_len("password", password, MIN_PASSWORD_LEN);
        }
        v.finish()
    }
}

impl From<SignUpRequest> for SignUpInput {
    fn from(req: SignUpRequest) -> Self {
        Self {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            password: req.password.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Validate for SignInRequest {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        if let Some(email) = v.required("email", &self.email) {
            v.email("email", email);
        }
        if let Some(password) = v.required("password", &self.password) {
            v.min_len("password", password, MIN_PASSWORD_LEN);
        }
        v.finish()
    }
}

impl From<SignInRequest> for SignInInput {
    fn from(req: SignInRequest) -> Self {
        Self {
            email: req.email.unwrap_or_default(),
            password: req.password.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        if let Some(name) = &self.name {
            v.min_len("name", name, 1);
        }
        if let Some(password) = &self.password {
            v.min_len("password", password, MIN_PASSWORD_LEN);
        }
        v.finish()
    }
}

impl From<UpdateProfileRequest> for UpdateProfileInput {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            name: req.name,
            password: req.password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub role: Option<String>,
}

impl UpdateRoleRequest {
    pub fn role(&self) -> DomainResult<Role> {
        let raw = self.role.as_deref().unwrap_or_default();
        Role::from_str(raw).map_err(|_| {
            DomainError::validation(
                VALIDATION_MESSAGE,
                vec![FieldError::new("role", invalid_role_message(raw))],
            )
        })
    }
}

impl Validate for UpdateRoleRequest {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        if let Some(raw) = v.required("role", &self.role) {
            if Role::from_str(raw).is_err() {
                v.push("role", invalid_role_message(raw));
            }
        }
        v.finish()
    }
}

fn invalid_role_message(received: &str) -> String {
    let expected: Vec<String> = Role::ALL.iter().map(|r| format!("'{}'", r.as_str())).collect();
    format!(
        "Invalid enum value. Expected {}, received '{received}'",
        expected.join(" | ")
    )
}

/// `?page=&limit=`, both positive integers.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

impl PaginationQuery {
    /// `(page, limit)` with defaults applied. Call after `validate`.
    pub fn resolve(&self) -> (u64, u64) {
        let page = positive_int(self.page.as_deref()).unwrap_or(DEFAULT_PAGE);
        let limit = positive_int(self.limit.as_deref()).unwrap_or(DEFAULT_LIMIT);
        (page, limit)
    }
}

fn positive_int(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|n| *n >= 1)
}

impl Validate for PaginationQuery {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        for (field, raw) in [("page", &self.page), ("limit", &self.limit)] {
            let Some(raw) = raw else { continue };
            match raw.trim().parse::<u64>() {
                Ok(n) if n >= 1 => {}
                Ok(_) => v.push(field, "Number must be greater than or equal to 1"),
                Err(_) => v.push(field, "Expected a positive integer"),
            }
        }
        v.finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeadLetterQuery {
    #[serde(default)]
    pub limit: Option<String>,
}

pub const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;

impl DeadLetterQuery {
    pub fn resolve(&self) -> usize {
        positive_int(self.limit.as_deref())
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
    }
}

impl Validate for DeadLetterQuery {
    fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::default();
        if let Some(raw) = &self.limit {
            if positive_int(Some(raw)).is_none() {
                v.push("limit", "Expected a positive integer");
            }
        }
        v.finish()
    }
}

/// Data of the paginated listing.
#[derive(Debug, Serialize)]
pub struct PaginatedUsers {
    pub users: Vec<UserSummary>,
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

/// JSON body extractor that runs [`Validate`]. Malformed JSON is reported as a
/// validation error rather than axum's plain-text rejection.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            ApiError::validation(
                VALIDATION_MESSAGE,
                vec![FieldError::new("body", rejection.body_text())],
            )
        })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Query-string counterpart of [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                ApiError::validation(
                    VALIDATION_MESSAGE,
                    vec![FieldError::new("query", rejection.body_text())],
                )
            })?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Success envelope: `{success:true, status, message, data}`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: &'static str,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &'static str, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: &'static str, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    pub fn with_status(status: StatusCode, message: &'static str, data: T) -> Self {
        Self {
            status,
            message,
            data,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    success: bool,
    status: u16,
    message: &'a str,
    data: &'a T,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            status: self.status.as_u16(),
            message: self.message,
            data: &self.data,
        };
        (self.status, Json(body)).into_response()
    }
}
