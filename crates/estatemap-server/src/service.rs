//! Cached house queries.
//!
//! Every read goes through [`HybridCache::get_or_create`] under one of three
//! regions, so a data change can drop a whole family of results with a
//! single version bump.

use std::sync::Arc;

use estatemap_cache::{CacheEntryPolicy, CacheError, CancellationToken, HybridCache};

use crate::query::{self, Bounds, HouseLocation, MapSearchRequest, Pagination, normalize_radius_km};
use crate::repository::{DynHouseRepository, RepositoryError};

/// Cache regions used by the house queries.
pub mod regions {
    /// Viewport queries, shared with [`MapCacheService`](crate::MapCacheService).
    pub const MAP_SEARCH: &str = "map-search";
    pub const RADIUS_SEARCH: &str = "radius-search";
    pub const LISTINGS: &str = "listings";

    pub const ALL: [&str; 3] = [MAP_SEARCH, RADIUS_SEARCH, LISTINGS];
}

/// Page used for viewport queries.
pub const BOUNDS_PAGE: Pagination = Pagination {
    page_number: 1,
    page_size: 200,
};

pub type QueryResult = Result<Vec<HouseLocation>, CacheError<RepositoryError>>;

pub struct HouseQueryService {
    cache: Arc<HybridCache>,
    repository: DynHouseRepository,
    policy: CacheEntryPolicy,
}

impl HouseQueryService {
    pub fn new(
        cache: Arc<HybridCache>,
        repository: DynHouseRepository,
        policy: CacheEntryPolicy,
    ) -> Self {
        Self {
            cache,
            repository,
            policy,
        }
    }

    /// Radius search when the request carries a centre, otherwise a
    /// filtered listing page.
    pub async fn search(
        &self,
        request: &MapSearchRequest,
        cancel: &CancellationToken,
    ) -> QueryResult {
        let Some((lat, lng)) = request.center() else {
            return self.get_list(request, cancel).await;
        };

        let page = request.pagination();
        let radius = normalize_radius_km(request.radius_km);
        let key = query::radius_key(lat, lng, radius, &page);
        let repository = &self.repository;

        self.cache
            .get_or_create(
                regions::RADIUS_SEARCH,
                &key,
                |_| async move { repository.search_by_radius(lat, lng, radius, &page).await },
                &self.policy,
                cancel,
            )
            .await
    }

    /// Houses inside a viewport, first [`BOUNDS_PAGE`] only.
    pub async fn get_by_bounds(
        &self,
        bounds: &Bounds,
        cancel: &CancellationToken,
    ) -> QueryResult {
        let key = query::bounds_key(bounds);
        let repository = &self.repository;

        self.cache
            .get_or_create(
                regions::MAP_SEARCH,
                &key,
                |_| async move { repository.search_by_bounds(bounds, &BOUNDS_PAGE).await },
                &self.policy,
                cancel,
            )
            .await
    }

    /// One page of houses matching the request's text filters.
    pub async fn get_list(
        &self,
        request: &MapSearchRequest,
        cancel: &CancellationToken,
    ) -> QueryResult {
        let page = request.pagination();
        let filter = request.listing_filter();
        let key = query::listing_key(&filter, &page);
        let repository = &self.repository;

        self.cache
            .get_or_create(
                regions::LISTINGS,
                &key,
                |_| async move { repository.search_by_filters(&filter, &page).await },
                &self.policy,
                cancel,
            )
            .await
    }

    /// Drop every cached house query. Call after house data changes.
    pub async fn invalidate_all(&self, cancel: &CancellationToken) {
        for region in regions::ALL {
            self.cache.invalidate_region(region, cancel).await;
        }
    }
}
