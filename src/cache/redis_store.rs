//! Redis-backed cache store, shared between instances

use super::Store;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

pub struct RedisStore {
    connection_manager: redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

fn store_error(operation: &str, e: redis::RedisError) -> AppError {
    AppError::Internal(format!("redis {operation} failed: {e}"))
}

/// Redis expiries are whole seconds; round sub-second TTLs up so nothing is stored forever
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

impl RedisStore {
    /// Connect to Redis
    ///
    /// # Errors
    /// Returns an internal error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let client = redis::Client::open(url).map_err(|e| store_error("connect", e))?;
        let connection_manager = client
            .get_connection_manager()
            .await
            .map_err(|e| store_error("connect", e))?;

        tracing::info!("Connected to Redis cache store");
        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        conn.get(key).await.map_err(|e| store_error("GET", e))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds(ttl))
            .await
            .map_err(|e| store_error("SETEX", e))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.connection_manager.clone();
        let seconds = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        conn.expire(key, seconds)
            .await
            .map_err(|e| store_error("EXPIRE", e))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection_manager.clone();
        let _: () = conn.del(key).await.map_err(|e| store_error("DEL", e))?;
        Ok(())
    }
}
