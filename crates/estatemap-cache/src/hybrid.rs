//! Get-or-create over the tiered store with single-flight recomputation.
//!
//! ## Flow
//!
//! ```text
//! get_or_create(region, key)
//!   version  = regions.get_version(region)
//!   full_key = build_key(region, version, key)
//!   fast tier hit?           → return            (no lock)
//!   shared tier hit?         → fill fast, return (no lock)
//!   acquire stripe(full_key)
//!     fast / shared again    → return
//!     factory(cancel)        → fill fast + shared, return
//!   release stripe           (guard drop, also on error)
//! ```
//!
//! Within one process at most one factory runs per fully-qualified key.
//! Different processes each enforce this on their own.

use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::key;
use crate::lock::KeyedMutex;
use crate::metrics;
use crate::policy::CacheEntryPolicy;
use crate::region::RegionVersionRegistry;
use crate::shared::DynSharedStore;
use crate::tiered::TieredStore;

/// Hybrid cache: fast tier, optional shared tier, region versions and
/// striped locks.
pub struct HybridCache {
    store: TieredStore,
    regions: RegionVersionRegistry,
    locks: KeyedMutex,
}

impl HybridCache {
    pub fn new(store: TieredStore, regions: RegionVersionRegistry, locks: KeyedMutex) -> Self {
        Self {
            store,
            regions,
            locks,
        }
    }

    /// Build a cache from configuration, sharing `shared` between the
    /// entry store and the region registry.
    pub fn from_config(config: &CacheConfig, shared: Option<DynSharedStore>) -> Self {
        Self::new(
            TieredStore::from_config(config, shared.clone()),
            RegionVersionRegistry::new(shared),
            KeyedMutex::default(),
        )
    }

    /// Return the cached value for `(region, key)` or compute it with
    /// `factory`.
    ///
    /// The factory's error is returned unchanged and nothing is cached, so
    /// the next call retries. Cancelling `cancel` aborts the wait for the
    /// lock and drops a running factory; nothing is cached in that case
    /// either.
    pub async fn get_or_create<T, E, F, Fut>(
        &self,
        region: &str,
        key: &str,
        factory: F,
        policy: &CacheEntryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T, CacheError<E>>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let version = self.regions.get_version(region).await;
        let full_key = key::build_key(region, version, key);

        if let Some(value) = self.lookup::<T>(&full_key, policy).await {
            return Ok(value);
        }

        let _guard = self
            .locks
            .acquire(&full_key, cancel)
            .await
            .map_err(|_| CacheError::Cancelled)?;

        // Another caller may have filled the entry while we waited.
        if let Some(value) = self.lookup::<T>(&full_key, policy).await {
            return Ok(value);
        }

        metrics::record_cache_miss();
        metrics::record_factory_invocation(region);
        tracing::debug!(region = %region, key = %full_key, "cache miss, invoking factory");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = factory(cancel.clone()) => Some(result),
        };

        let created = match outcome {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                tracing::debug!(region = %region, key = %full_key, "factory failed, nothing cached");
                return Err(CacheError::Factory(e));
            }
            None => {
                tracing::debug!(region = %region, key = %full_key, "cancelled while computing");
                return Err(CacheError::Cancelled);
            }
        };

        self.store.set(&full_key, created.clone(), policy).await;
        Ok(created)
    }

    /// Make every entry of `region` unreachable by moving it to a new
    /// version. Returns the new version.
    ///
    /// The local bump always happens; cancelling `cancel` only abandons the
    /// shared-tier mirror write.
    pub async fn invalidate_region(&self, region: &str, cancel: &CancellationToken) -> u64 {
        let version = self.regions.bump_local(region);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(region = %region, version, "region version mirror abandoned");
            }
            _ = self.regions.publish(region, version) => {}
        }

        version
    }

    /// Whether a shared tier is attached.
    pub fn has_shared_store(&self) -> bool {
        self.store.has_shared()
    }

    pub fn regions(&self) -> &RegionVersionRegistry {
        &self.regions
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }

    async fn lookup<T>(&self, full_key: &str, policy: &CacheEntryPolicy) -> Option<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        if let Some(value) = self.store.try_get_local::<T>(full_key).await {
            return Some(value);
        }

        let value = self.store.try_get_shared::<T>(full_key).await?;
        self.store.set_local(full_key, value.clone(), policy).await;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn policy() -> CacheEntryPolicy {
        CacheEntryPolicy::new(Duration::from_secs(600), Duration::from_secs(120))
    }

    fn cache() -> HybridCache {
        HybridCache::from_config(&CacheConfig::default(), None)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            let value = cache
                .get_or_create(
                    "listings",
                    "page=1",
                    |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(vec!["h1".to_string()])
                    },
                    &policy(),
                    &cancel,
                )
                .await
                .unwrap();
            assert_eq!(value, vec!["h1".to_string()]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_region_returns_new_version() {
        let cache = cache();
        let cancel = CancellationToken::new();
        let before = cache.regions().get_version("listings").await;
        let after = cache.invalidate_region("listings", &cancel).await;
        assert!(after > before);
        assert_eq!(cache.regions().local_version("listings"), Some(after));
    }

    #[tokio::test]
    async fn invalidation_with_cancelled_token_still_bumps_locally() {
        let cache = cache();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let version = cache.invalidate_region("listings", &cancel).await;
        assert_eq!(cache.regions().local_version("listings"), Some(version));
    }

    #[tokio::test]
    async fn factory_receives_the_callers_token() {
        let cache = Arc::new(cache());
        let cancel = CancellationToken::new();

        let seen = cache
            .get_or_create(
                "listings",
                "token",
                |token| async move { Ok::<_, Infallible>(token.is_cancelled()) },
                &policy(),
                &cancel,
            )
            .await
            .unwrap();
        assert!(!seen);
    }
}
