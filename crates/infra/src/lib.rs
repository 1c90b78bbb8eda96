//! Infrastructure layer: credential stores, caches and the background job system.

pub mod cache;
pub mod jobs;
pub mod users;

pub use cache::InMemoryCache;
pub use users::InMemoryCredentialStore;

#[cfg(feature = "redis")]
pub use cache::RedisCache;
#[cfg(feature = "postgres")]
pub use users::PostgresCredentialStore;
