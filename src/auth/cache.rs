//! Verification cache backends.
//!
//! [`AuthCache`] is the get/set-with-TTL contract the verifier relies on.
//! [`MemoryAuthCache`] keeps entries in process; [`KeyDbAuthCache`] shares
//! them between replicas through KeyDB.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fred::interfaces::{ClientLike, KeysInterface};
use moka::future::Cache;
use moka::Expiry;
use thiserror::Error;
use tracing::trace;

/// Failure of a cache backend.  Never turned into an authentication verdict.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<fred::error::Error> for CacheError {
    fn from(err: fred::error::Error) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Key/value store with per-entry expiration, shared by all verifications.
///
/// `get` never returns an entry whose TTL has elapsed.  `set` overwrites any
/// existing entry for the key.
#[async_trait]
pub trait AuthCache: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &[u8], value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Liveness check used by `/healthz`.
    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    /// Release external resources at process shutdown.
    async fn shutdown(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<Vec<u8>, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &Vec<u8>,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Vec<u8>,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local cache backed by `moka`, bounded to `max_entries`.
///
/// Capacity eviction only ever produces a miss.
#[derive(Clone)]
pub struct MemoryAuthCache {
    inner: Cache<Vec<u8>, Entry>,
}

impl MemoryAuthCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl AuthCache for MemoryAuthCache {
    async fn get(&self, key: &[u8]) -> Result<Option<String>, CacheError> {
        let hit = self.inner.get(key).await.map(|entry| entry.value);
        trace!(key = %hex::encode(key), hit = hit.is_some(), "memory cache get");
        Ok(hit)
    }

    async fn set(&self, key: &[u8], value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner
            .insert(
                key.to_vec(),
                Entry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        trace!(key = %hex::encode(key), ttl_secs = ttl.as_secs(), "memory cache set");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyDB backend
// ---------------------------------------------------------------------------

/// Cache shared between replicas through KeyDB / Redis.
///
/// Keys are stored as `{prefix}{hex(key)}` with a server-side `EX` TTL.
#[derive(Clone)]
pub struct KeyDbAuthCache {
    pool: fred::clients::Pool,
    prefix: String,
}

impl KeyDbAuthCache {
    pub fn new(pool: fred::clients::Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &[u8]) -> String {
        format!("{}{}", self.prefix, hex::encode(key))
    }
}

#[async_trait]
impl AuthCache for KeyDbAuthCache {
    async fn get(&self, key: &[u8]) -> Result<Option<String>, CacheError> {
        let key = self.redis_key(key);
        let val: Option<String> = self.pool.get(key.as_str()).await?;
        if val.is_some() {
            trace!(key, "keydb cache hit");
        }
        Ok(val)
    }

    async fn set(&self, key: &[u8], value: &str, ttl: Duration) -> Result<(), CacheError> {
        let key = self.redis_key(key);
        // EX 0 is rejected by the server; round sub-second TTLs up.
        let ttl_secs = i64::try_from(ttl.as_secs().max(1))
            .map_err(|_| CacheError::Backend(format!("ttl out of range: {ttl:?}")))?;
        let _: () = self
            .pool
            .set(
                key.as_str(),
                value,
                Some(fred::types::Expiration::EX(ttl_secs)),
                None,
                false,
            )
            .await?;
        trace!(key, ttl_secs, "keydb cache set");
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let _: String = self.pool.ping(None).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CacheError> {
        self.pool.quit().await?;
        Ok(())
    }
}
