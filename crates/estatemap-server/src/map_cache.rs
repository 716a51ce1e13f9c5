use std::future::Future;
use std::sync::Arc;

use estatemap_cache::{CacheConfig, CacheEntryPolicy, CacheError, CancellationToken, HybridCache};

use crate::query::{Bounds, HouseLocation, bounds_key};
use crate::service::regions;

/// Viewport cache for callers that bring their own loader.
///
/// Entries live in the `map-search` region under the same keys as
/// [`HouseQueryService::get_by_bounds`](crate::HouseQueryService::get_by_bounds).
pub struct MapCacheService {
    cache: Arc<HybridCache>,
    policy: CacheEntryPolicy,
}

impl MapCacheService {
    pub fn new(cache: Arc<HybridCache>, config: &CacheConfig) -> Self {
        Self {
            cache,
            policy: config.default_policy(),
        }
    }

    pub async fn get_or_add<F, Fut, E>(
        &self,
        bounds: &Bounds,
        factory: F,
        cancel: &CancellationToken,
    ) -> Result<Vec<HouseLocation>, CacheError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Vec<HouseLocation>, E>>,
    {
        let key = bounds_key(bounds);
        self.cache
            .get_or_create(regions::MAP_SEARCH, &key, factory, &self.policy, cancel)
            .await
    }

    /// Drop every cached viewport. Returns the region's new version.
    pub async fn invalidate(&self, cancel: &CancellationToken) -> u64 {
        self.cache
            .invalidate_region(regions::MAP_SEARCH, cancel)
            .await
    }

    pub fn policy(&self) -> &CacheEntryPolicy {
        &self.policy
    }
}
