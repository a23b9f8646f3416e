//! Response cache
//!
//! Finished response envelopes are memoized under a request fingerprint for a fixed
//! TTL. The backing [`Store`] is injected: [`MemoryStore`] for a single process,
//! [`RedisStore`] when several instances share a cache.
//!
//! The cache never fails a request. A store error is logged and treated as a miss
//! on lookup, and as a skipped write on store.
//!
//! There is no single-flight de-duplication: two concurrent requests with the same
//! fingerprint may both run the full pipeline, and the later write wins.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::business::ChatMessage;
use crate::error::AppResult;
use crate::metrics::Metrics;
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Prefix applied to every cache key
const KEY_PREFIX: &str = "adscout:chat:";

/// Key-value store with per-entry expiry
#[async_trait]
pub trait Store: Send + Sync {
    /// Value for `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Insert or replace `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> AppResult<()>;

    /// Reset the expiry of a live entry; returns false if there is none
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    async fn delete(&self, key: &str) -> AppResult<()>;
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    message: &'a str,
    history: &'a [ChatMessage],
    page: u32,
    limit: u32,
}

/// Deterministic cache key for a chat request
///
/// Hex SHA-256 of the canonical JSON of `{message, history, page, limit}`. Page and
/// limit are part of the identity so different pages of one search never collide.
pub fn fingerprint(message: &str, history: &[ChatMessage], page: u32, limit: u32) -> String {
    let input = FingerprintInput {
        message,
        history,
        page,
        limit,
    };
    // Serializing strings, enums and integers cannot fail
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    format!("{KEY_PREFIX}{}", hex::encode(Sha256::digest(&canonical)))
}

/// Memoizes serialized response envelopes
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn Store>,
    ttl: Duration,
    metrics: Arc<Metrics>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn Store>, ttl: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            ttl,
            metrics,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached body for `key`; store failures count as a miss
    pub async fn lookup(&self, key: &str) -> Option<String> {
        let (result, label) = match self.store.get(key).await {
            Ok(Some(body)) => (Some(body), "hit"),
            Ok(None) => (None, "miss"),
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup failed, treating as miss");
                (None, "error")
            }
        };

        if let Err(e) = self.metrics.record_cache_lookup(label) {
            tracing::error!(error = %e, result = label, "Metrics recording failed (non-fatal)");
        }

        result
    }

    /// Store a finished response body
    pub async fn insert(&self, key: &str, body: String) {
        if let Err(e) = self.store.set(key, body, self.ttl).await {
            tracing::warn!(error = %e, "Cache write failed, response not cached");
        }
    }
}
