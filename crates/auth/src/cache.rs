use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use gatehouse_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialize(String),
}

impl From<CacheError> for DomainError {
    fn from(value: CacheError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// Key/value cache holding serialized JSON.
///
/// `invalidate` accepts either an exact key or a pattern ending in `*`, which
/// removes every key sharing the prefix.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn invalidate(&self, pattern: &str) -> Result<(), CacheError>;
}
