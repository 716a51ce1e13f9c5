//! Shared (L2) tier adapters.
//!
//! The shared tier holds serialized byte blobs with a TTL and is visible to
//! every instance pointed at it. It is an optimization only: callers treat
//! every error from it as a miss or a no-op.
//!
//! - [`RedisSharedStore`]: Redis via a `deadpool-redis` pool
//! - [`MemorySharedStore`]: in-process fallback when the shared tier is
//!   enabled without a Redis URL

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use moka::future::Cache;
use redis::AsyncCommands;

use crate::error::SharedStoreError;
use crate::policy::{CacheEntryPolicy, PolicyEntry, PolicyExpiry};

/// Byte-oriented store shared across instances.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Fetch a blob. A read of an entry with a sliding window renews it.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError>;

    /// Store a blob with the policy's expirations. `weight` is ignored.
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        policy: &CacheEntryPolicy,
    ) -> Result<(), SharedStoreError>;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;
}

pub type DynSharedStore = Arc<dyn SharedStore>;

// =============================================================================
// Redis
// =============================================================================

const FIELD_DATA: &str = "data";
const FIELD_ABSEXP: &str = "absexp";
const FIELD_SLDEXP: &str = "sldexp";

/// Redis-backed shared tier.
///
/// ## Entry Layout
///
/// Each entry is a hash under `{key_prefix}{key}`:
///
/// | Field    | Content                                  |
/// |----------|------------------------------------------|
/// | `data`   | payload bytes                            |
/// | `absexp` | absolute deadline, unix milliseconds     |
/// | `sldexp` | sliding window in milliseconds, 0 = none |
///
/// The key's Redis TTL is the effective lifetime; reads of sliding entries
/// push it forward, never past `absexp`.
#[derive(Clone)]
pub struct RedisSharedStore {
    pool: Pool,
    key_prefix: String,
    timeout: Duration,
}

impl RedisSharedStore {
    pub fn new(pool: Pool, key_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
            timeout,
        }
    }

    #[inline]
    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, SharedStoreError>>,
    ) -> Result<T, SharedStoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SharedStoreError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Check that a connection can be checked out (for health checks).
    pub async fn is_available(&self) -> bool {
        self.bounded(self.ping()).await.is_ok()
    }

    async fn ping(&self) -> Result<(), SharedStoreError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn fetch(&self, key: String) -> Result<Option<Vec<u8>>, SharedStoreError> {
        let mut conn = self.pool.get().await?;
        let (data, absexp, sldexp): (Option<Vec<u8>>, Option<i64>, Option<i64>) =
            redis::cmd("HMGET")
                .arg(&key)
                .arg(FIELD_DATA)
                .arg(FIELD_ABSEXP)
                .arg(FIELD_SLDEXP)
                .query_async(&mut conn)
                .await?;

        let Some(data) = data else {
            return Ok(None);
        };

        if let Some(sliding_ms) = sldexp.filter(|ms| *ms > 0) {
            let mut ttl_ms = sliding_ms;
            if let Some(deadline) = absexp.filter(|ms| *ms > 0) {
                ttl_ms = ttl_ms.min(deadline - unix_millis());
            }
            if ttl_ms > 0 {
                let _: () = conn.pexpire(&key, ttl_ms).await?;
            }
        }

        Ok(Some(data))
    }

    async fn store(
        &self,
        key: String,
        value: &[u8],
        policy: &CacheEntryPolicy,
    ) -> Result<(), SharedStoreError> {
        let ttl_ms = duration_millis(policy.initial_ttl());
        if ttl_ms <= 0 {
            return Ok(());
        }

        let absexp = unix_millis().saturating_add(duration_millis(policy.absolute()));
        let sldexp = duration_millis(policy.sliding());

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(&key)
            .arg(FIELD_DATA)
            .arg(value)
            .arg(FIELD_ABSEXP)
            .arg(absexp)
            .arg(FIELD_SLDEXP)
            .arg(sldexp)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(ttl_ms)
            .ignore();

        let mut conn = self.pool.get().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl SharedStore for RedisSharedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
        self.bounded(self.fetch(self.prefixed(key))).await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        policy: &CacheEntryPolicy,
    ) -> Result<(), SharedStoreError> {
        self.bounded(self.store(self.prefixed(key), value, policy))
            .await
    }

    fn kind(&self) -> &'static str {
        "redis"
    }
}

/// Milliseconds of a clamped policy duration; always fits an `i64`.
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn unix_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

// =============================================================================
// In-process
// =============================================================================

/// Default weight budget of [`MemorySharedStore`], in bytes.
pub const DEFAULT_MEMORY_STORE_CAPACITY: u64 = 64 * 1024 * 1024;

#[derive(Clone)]
struct MemoryEntry {
    data: Arc<[u8]>,
    policy: CacheEntryPolicy,
}

impl PolicyEntry for MemoryEntry {
    fn policy(&self) -> &CacheEntryPolicy {
        &self.policy
    }
}

/// In-process shared tier.
///
/// Only shared by clones within one process. Used when the shared tier is
/// enabled but no Redis URL is configured, and in tests to stand in for a
/// store seen by several cache instances.
///
/// Entries are weighed by key and payload bytes. Expired entries, including
/// ones orphaned by a region version bump, are evicted by moka's maintenance
/// without needing a read.
#[derive(Clone)]
pub struct MemorySharedStore {
    entries: Cache<String, MemoryEntry>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_STORE_CAPACITY)
    }

    /// Create a store holding at most `capacity_bytes` of keys and payloads.
    pub fn with_capacity(capacity_bytes: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|key: &String, entry: &MemoryEntry| {
                u32::try_from(key.len() + entry.data.len()).unwrap_or(u32::MAX)
            })
            .expire_after(PolicyExpiry)
            .build();
        Self { entries }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Approximate bytes held, keys included.
    pub fn weighted_size(&self) -> u64 {
        self.entries.weighted_size()
    }

    /// Flush pending evictions so counts are exact.
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for MemorySharedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemorySharedStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
        Ok(self.entries.get(key).await.map(|entry| entry.data.to_vec()))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        policy: &CacheEntryPolicy,
    ) -> Result<(), SharedStoreError> {
        let entry = MemoryEntry {
            data: Arc::from(value),
            policy: *policy,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
