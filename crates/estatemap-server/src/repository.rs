//! Data source seam for house queries.
//!
//! The SQL-backed implementation lives with the host; the cached services
//! only depend on this trait.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::{Bounds, HouseLocation, ListingFilter, Pagination};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("query timed out after {0}ms")]
    Timeout(u64),
}

/// Read access to house locations.
#[async_trait]
pub trait HouseRepository: Send + Sync {
    async fn search_by_bounds(
        &self,
        bounds: &Bounds,
        pagination: &Pagination,
    ) -> Result<Vec<HouseLocation>, RepositoryError>;

    async fn search_by_radius(
        &self,
        center_lat: f64,
        center_lng: f64,
        radius_km: f64,
        pagination: &Pagination,
    ) -> Result<Vec<HouseLocation>, RepositoryError>;

    async fn search_by_filters(
        &self,
        filter: &ListingFilter,
        pagination: &Pagination,
    ) -> Result<Vec<HouseLocation>, RepositoryError>;
}

pub type DynHouseRepository = Arc<dyn HouseRepository>;
