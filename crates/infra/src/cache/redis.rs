//! Redis-backed cache (optional).
//!
//! Values are stored with `SET .. EX`; pattern invalidation resolves the keys
//! with `KEYS` and deletes them in one `DEL`.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use gatehouse_auth::{Cache, CacheError};

#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        Ok(Self { conn })
    }
}

fn backend(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // EX 0 is rejected by Redis.
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, secs).await.map_err(backend)
    }

    async fn invalidate(&self, pattern: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = if pattern.ends_with('*') {
            conn.keys(pattern).await.map_err(backend)?
        } else {
            vec![pattern.to_string()]
        };
        if keys.is_empty() {
            return Ok(());
        }
        conn.del::<_, ()>(keys).await.map_err(backend)
    }
}
