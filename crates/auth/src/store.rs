//! Credential store contract.

use async_trait::async_trait;
use thiserror::Error;

use gatehouse_core::{DomainError, UserId};

use crate::{NewUser, User, UserPatch, UserSummary};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The unique-email constraint rejected an insert.
    #[error("a user with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateEmail(_) => DomainError::conflict("User already exists."),
            StoreError::Backend(msg) => DomainError::internal(msg),
        }
    }
}

/// Persistence for user records.
///
/// Implementations must enforce email uniqueness at insert time and provide
/// atomic find-and-update. Listings are returned in store (insertion) order.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Returns the updated record, or `None` when no user has this id.
    async fn update_by_id(&self, id: UserId, patch: UserPatch) -> Result<Option<User>, StoreError>;

    async fn list_all(&self) -> Result<Vec<UserSummary>, StoreError>;

    /// Returns the requested slice and the total number of users.
    async fn list_paginated(&self, skip: u64, limit: u64)
    -> Result<(Vec<UserSummary>, u64), StoreError>;
}
