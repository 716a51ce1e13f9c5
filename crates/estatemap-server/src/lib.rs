//! Host side of the EstateMap cache: configuration, tracing and the cached
//! house query services.

pub mod config;
pub mod map_cache;
pub mod observability;
pub mod query;
pub mod repository;
pub mod service;
pub mod warmup;

use std::sync::Arc;

pub use config::{AppConfig, DataSourceConfig, LoggingConfig};
pub use estatemap_cache::{CacheError, CancellationToken, HybridCache};
pub use map_cache::MapCacheService;
pub use query::{Bounds, HouseLocation, ListingFilter, MapSearchRequest, Pagination};
pub use repository::{DynHouseRepository, HouseRepository, RepositoryError};
pub use service::{HouseQueryService, QueryResult, regions};
pub use warmup::{CacheWarmup, WarmupOutcome};

/// Create the hybrid cache from configuration.
///
/// Never fails: if the shared tier can't be reached the cache runs on the
/// fast tier alone.
pub async fn build_hybrid_cache(config: &AppConfig) -> Arc<HybridCache> {
    let shared = estatemap_cache::create_shared_store(&config.cache, &config.redis).await;

    match shared.as_ref() {
        Some(store) => tracing::info!(
            shared = store.kind(),
            memory_size_limit = config.cache.memory_size_limit,
            "hybrid cache initialized"
        ),
        None => tracing::info!(
            memory_size_limit = config.cache.memory_size_limit,
            "hybrid cache initialized without shared tier"
        ),
    }

    Arc::new(HybridCache::from_config(&config.cache, shared))
}

/// The cached services wired together.
pub struct HouseServices {
    pub cache: Arc<HybridCache>,
    pub queries: Arc<HouseQueryService>,
    pub map_cache: MapCacheService,
    pub warmup: CacheWarmup,
}

impl HouseServices {
    pub async fn build(config: &AppConfig, repository: DynHouseRepository) -> Self {
        let cache = build_hybrid_cache(config).await;
        Self::with_cache(config, cache, repository)
    }

    /// Wire the services around an existing cache.
    pub fn with_cache(
        config: &AppConfig,
        cache: Arc<HybridCache>,
        repository: DynHouseRepository,
    ) -> Self {
        let queries = Arc::new(HouseQueryService::new(
            cache.clone(),
            repository,
            config.cache.default_policy(),
        ));
        Self {
            map_cache: MapCacheService::new(cache.clone(), &config.cache),
            warmup: CacheWarmup::new(queries.clone(), config),
            queries,
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_a_local_cache() {
        let cache = build_hybrid_cache(&AppConfig::default()).await;
        assert!(!cache.has_shared_store());
    }

    #[tokio::test]
    async fn shared_store_without_url_uses_memory_tier() {
        let mut config = AppConfig::default();
        config.cache.enable_shared_store = true;
        let cache = build_hybrid_cache(&config).await;
        assert!(cache.has_shared_store());
    }
}
