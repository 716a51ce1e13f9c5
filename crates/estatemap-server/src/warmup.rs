//! Startup cache warmup.

use std::sync::Arc;

use estatemap_cache::CancellationToken;

use crate::config::AppConfig;
use crate::query::{MAX_PAGE_SIZE, MapSearchRequest};
use crate::service::HouseQueryService;

/// What a warmup run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupOutcome {
    /// Disabled, or there is no database to warm from.
    Skipped,
    Completed { rows: usize },
    Failed,
}

/// Loads the first listing page once at startup so the first real request
/// is served from cache.
pub struct CacheWarmup {
    service: Arc<HouseQueryService>,
    enabled: bool,
    page_size: i32,
}

impl CacheWarmup {
    pub fn new(service: Arc<HouseQueryService>, config: &AppConfig) -> Self {
        Self {
            service,
            enabled: config.cache.warmup_on_startup && config.data_source.use_database,
            page_size: config.cache.warmup_page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run the warmup. Never fails; problems are logged.
    pub async fn run(&self, cancel: &CancellationToken) -> WarmupOutcome {
        if !self.enabled {
            tracing::debug!("house cache warmup skipped");
            return WarmupOutcome::Skipped;
        }

        let request = MapSearchRequest {
            page_number: 1,
            page_size: self.page_size,
            ..MapSearchRequest::default()
        };

        match self.service.get_list(&request, cancel).await {
            Ok(rows) => {
                tracing::info!(
                    rows = rows.len(),
                    page_size = self.page_size,
                    "house cache warmup completed"
                );
                WarmupOutcome::Completed { rows: rows.len() }
            }
            Err(e) => {
                tracing::warn!(error = %e, "house cache warmup failed");
                WarmupOutcome::Failed
            }
        }
    }

    /// Run the warmup on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<WarmupOutcome> {
        tokio::spawn(async move { self.run(&cancel).await })
    }
}
