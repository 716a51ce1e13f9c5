//! Hybrid caching engine for expensive read paths.
//!
//! ## Architecture
//!
//! - **Fast tier (moka)**: in-process, size-bounded, per-entry absolute and
//!   sliding expiration
//! - **Shared tier (Redis)**: optional, shared across instances, payload size
//!   capped, strictly best-effort
//! - **Region versions**: invalidate a whole group of entries by bumping a
//!   counter embedded in their keys
//! - **Striped locks**: at most one recomputation per key per process
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the cache keeps working from the
//! fast tier alone. Shared-tier failures are logged, never returned.

pub mod config;
pub mod error;
pub mod hybrid;
pub mod key;
pub mod lock;
pub mod metrics;
pub mod policy;
pub mod region;
pub mod shared;
pub mod tiered;

use std::sync::Arc;
use std::time::Duration;

pub use config::{CacheConfig, MAX_EXPIRATION_MINUTES, RedisConfig};
pub use error::{CacheError, SharedStoreError};
pub use hybrid::HybridCache;
pub use key::build_key;
pub use lock::KeyedMutex;
pub use policy::{CacheEntryPolicy, MAX_TTL};
pub use region::RegionVersionRegistry;
pub use shared::{DynSharedStore, MemorySharedStore, RedisSharedStore, SharedStore};
pub use tiered::TieredStore;
pub use tokio_util::sync::CancellationToken;

/// Create the shared tier based on configuration.
///
/// ## Modes
///
/// - **Shared tier disabled**: `None` (fast tier only)
/// - **Enabled, no Redis URL**: in-process [`MemorySharedStore`]
/// - **Enabled with a Redis URL**: [`RedisSharedStore`], or `None` if the
///   pool can't be created or the first connection fails
///
/// Start-up never fails because of the shared tier.
pub async fn create_shared_store(
    cache: &CacheConfig,
    redis: &RedisConfig,
) -> Option<DynSharedStore> {
    if !cache.enable_shared_store {
        tracing::info!("Shared cache disabled, using in-process cache only");
        return None;
    }

    let Some(url) = redis.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        tracing::info!("No Redis URL configured, using in-process shared cache");
        return Some(Arc::new(MemorySharedStore::new()));
    };

    tracing::info!(url = %url, "Connecting to Redis");

    let timeout = Duration::from_millis(redis.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(redis.pool_size.max(1));
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut redis_config = deadpool_redis::Config::from_url(url);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process cache only."
            );
            return None;
        }
    };

    let store = RedisSharedStore::new(pool, redis.key_prefix.clone(), timeout);
    if store.is_available().await {
        tracing::info!("Connected to Redis shared cache");
        Some(Arc::new(store))
    } else {
        tracing::warn!("Failed to connect to Redis. Falling back to in-process cache only.");
        None
    }
}
