//! Region versions.
//!
//! A region groups cache entries that are invalidated together. Entries are
//! never enumerated: every fully-qualified key embeds the region's current
//! version, so bumping the version makes all older keys unreachable and they
//! simply expire.
//!
//! ## Cross-Instance Visibility
//!
//! Versions are mirrored to the shared tier under a long TTL. An instance
//! reads the mirror only for regions it has not seen yet; once a region is
//! known locally it keeps its version until the process restarts. A bump on
//! one instance is therefore not observed by instances that already hold the
//! region.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::key;
use crate::metrics;
use crate::policy::CacheEntryPolicy;
use crate::shared::DynSharedStore;

/// Version assigned to a region nobody has invalidated yet.
pub const INITIAL_VERSION: u64 = 1;

/// Lifetime of the version record in the shared tier.
const VERSION_RECORD_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Tracks the current version of every region seen by this process.
pub struct RegionVersionRegistry {
    versions: DashMap<String, u64>,
    shared: Option<DynSharedStore>,
}

impl RegionVersionRegistry {
    pub fn new(shared: Option<DynSharedStore>) -> Self {
        Self {
            versions: DashMap::new(),
            shared,
        }
    }

    /// Current version of `region`.
    ///
    /// Unknown regions are loaded from the shared tier if possible, otherwise
    /// start at [`INITIAL_VERSION`]. Never fails: shared-tier errors are
    /// logged and ignored.
    pub async fn get_version(&self, region: &str) -> u64 {
        if let Some(version) = self.versions.get(region) {
            return *version;
        }

        if let Some(version) = self.load_shared(region).await {
            return self.remember(region, version).0;
        }

        let (version, inserted) = self.remember(region, INITIAL_VERSION);
        if inserted {
            self.store_shared(region, version).await;
        }
        version
    }

    /// Move `region` to a fresh version and return it.
    ///
    /// The new version is the wall clock in unix milliseconds, or the
    /// previous version plus one if the clock has not moved past it, so
    /// successive bumps always increase. The shared-tier mirror is best
    /// effort.
    pub async fn bump(&self, region: &str) -> u64 {
        let version = self.bump_local(region);
        self.publish(region, version).await;
        version
    }

    /// Local half of [`bump`](Self::bump).
    pub(crate) fn bump_local(&self, region: &str) -> u64 {
        let version = {
            let mut slot = self.versions.entry(region.to_string()).or_insert(0);
            let next = unix_millis().max(slot.saturating_add(1));
            *slot = next;
            next
        };

        metrics::record_region_invalidation(region);
        tracing::info!(region = %region, version, "cache region invalidated");
        version
    }

    /// Mirror `version` of `region` to the shared tier, if any.
    pub(crate) async fn publish(&self, region: &str, version: u64) {
        self.store_shared(region, version).await;
    }

    /// Locally known version, without touching the shared tier.
    pub fn local_version(&self, region: &str) -> Option<u64> {
        self.versions.get(region).map(|v| *v)
    }

    fn remember(&self, region: &str, version: u64) -> (u64, bool) {
        match self.versions.entry(region.to_string()) {
            Entry::Occupied(existing) => (*existing.get(), false),
            Entry::Vacant(slot) => {
                slot.insert(version);
                (version, true)
            }
        }
    }

    async fn load_shared(&self, region: &str) -> Option<u64> {
        let shared = self.shared.as_ref()?;

        match shared.get(&key::region_version_key(region)).await {
            Ok(Some(payload)) => {
                let version = std::str::from_utf8(&payload)
                    .ok()
                    .and_then(|s| s.trim().parse::<u64>().ok());
                if version.is_none() {
                    tracing::warn!(region = %region, "ignoring malformed region version record");
                }
                version
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(region = %region, error = %e, "failed to read region version from shared cache");
                metrics::record_shared_error("region_get");
                None
            }
        }
    }

    async fn store_shared(&self, region: &str, version: u64) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };

        let policy = CacheEntryPolicy::new(VERSION_RECORD_TTL, Duration::ZERO);
        let payload = version.to_string();
        if let Err(e) = shared
            .set(&key::region_version_key(region), payload.as_bytes(), &policy)
            .await
        {
            tracing::warn!(region = %region, version, error = %e, "failed to write region version to shared cache");
            metrics::record_shared_error("region_set");
        }
    }
}

fn unix_millis() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SharedStoreError;
    use crate::shared::{MemorySharedStore, SharedStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every call and counts them.
    #[derive(Default)]
    struct UnreachableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SharedStore for UnreachableStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, SharedStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SharedStoreError::Timeout(1))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &[u8],
            _policy: &CacheEntryPolicy,
        ) -> Result<(), SharedStoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SharedStoreError::Timeout(1))
        }

        fn kind(&self) -> &'static str {
            "unreachable"
        }
    }

    #[tokio::test]
    async fn unknown_region_starts_at_one() {
        let registry = RegionVersionRegistry::new(None);
        assert_eq!(registry.local_version("listings"), None);
        assert_eq!(registry.get_version("listings").await, INITIAL_VERSION);
        assert_eq!(registry.local_version("listings"), Some(INITIAL_VERSION));
    }

    #[tokio::test]
    async fn bump_strictly_increases() {
        let registry = RegionVersionRegistry::new(None);
        let v0 = registry.get_version("listings").await;
        let v1 = registry.bump("listings").await;
        let v2 = registry.bump("listings").await;
        let v3 = registry.bump("listings").await;

        assert!(v0 < v1 && v1 < v2 && v2 < v3);
        assert_eq!(registry.get_version("listings").await, v3);
    }

    #[tokio::test]
    async fn bump_only_affects_its_region() {
        let registry = RegionVersionRegistry::new(None);
        registry.get_version("a").await;
        registry.get_version("b").await;

        registry.bump("a").await;

        assert!(registry.get_version("a").await > INITIAL_VERSION);
        assert_eq!(registry.get_version("b").await, INITIAL_VERSION);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bumps_never_repeat_a_version() {
        let registry = Arc::new(RegionVersionRegistry::new(None));
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.bump("hot").await })
            })
            .collect();

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort_unstable();
        versions.dedup();

        assert_eq!(versions.len(), 32);
        assert_eq!(registry.local_version("hot"), versions.last().copied());
    }

    #[tokio::test]
    async fn version_is_mirrored_to_shared_tier() {
        let shared = MemorySharedStore::new();
        let first = RegionVersionRegistry::new(Some(Arc::new(shared.clone())));
        let bumped = first.bump("map-search").await;

        // A fresh instance picks up the mirrored version.
        let second = RegionVersionRegistry::new(Some(Arc::new(shared)));
        assert_eq!(second.get_version("map-search").await, bumped);
    }

    #[tokio::test]
    async fn initial_version_is_written_to_shared_tier() {
        let shared = MemorySharedStore::new();
        let registry = RegionVersionRegistry::new(Some(Arc::new(shared.clone())));
        registry.get_version("listings").await;

        let stored = shared
            .get(&key::region_version_key("listings"))
            .await
            .unwrap();
        assert_eq!(stored.as_deref(), Some(b"1".as_slice()));
    }

    #[tokio::test]
    async fn known_region_is_not_refreshed_from_shared_tier() {
        let shared = MemorySharedStore::new();
        let stale = RegionVersionRegistry::new(Some(Arc::new(shared.clone())));
        assert_eq!(stale.get_version("listings").await, INITIAL_VERSION);

        let other = RegionVersionRegistry::new(Some(Arc::new(shared)));
        other.bump("listings").await;

        assert_eq!(stale.get_version("listings").await, INITIAL_VERSION);
    }

    #[tokio::test]
    async fn malformed_shared_record_falls_back_to_initial() {
        let shared = MemorySharedStore::new();
        let policy = CacheEntryPolicy::new(VERSION_RECORD_TTL, Duration::ZERO);
        shared
            .set(&key::region_version_key("listings"), b"not-a-number", &policy)
            .await
            .unwrap();

        let registry = RegionVersionRegistry::new(Some(Arc::new(shared)));
        assert_eq!(registry.get_version("listings").await, INITIAL_VERSION);
    }

    #[tokio::test]
    async fn unreachable_shared_tier_never_fails_reads_or_bumps() {
        let store = Arc::new(UnreachableStore::default());
        let registry = RegionVersionRegistry::new(Some(store.clone()));

        assert_eq!(registry.get_version("listings").await, INITIAL_VERSION);
        assert!(registry.bump("listings").await > INITIAL_VERSION);
        // get + initial write + bump write
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}
