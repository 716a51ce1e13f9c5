//! Fast (L1) + shared (L2) storage.
//!
//! ## Lookup Order
//!
//! ```text
//! get_or_create → fast tier (moka) → shared tier (Redis / memory) → factory
//!                      ↓                    ↓
//!                 typed value        MessagePack blob
//! ```
//!
//! The fast tier keeps values type-erased and hands out clones; the shared
//! tier stores MessagePack payloads up to `max_payload_bytes`. Shared-tier
//! failures are logged and treated as misses.

use std::any::Any;
use std::sync::Arc;

use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::CacheConfig;
use crate::error::SharedStoreError;
use crate::metrics::{self, tier};
use crate::policy::{CacheEntryPolicy, PolicyEntry, PolicyExpiry};
use crate::shared::DynSharedStore;

/// A fast tier entry: the value and the policy it was written with.
#[derive(Clone)]
struct FastEntry {
    value: Arc<dyn Any + Send + Sync>,
    policy: CacheEntryPolicy,
}

impl PolicyEntry for FastEntry {
    fn policy(&self) -> &CacheEntryPolicy {
        &self.policy
    }
}

/// Two-tier store: a size-bounded in-process cache and an optional shared
/// store.
pub struct TieredStore {
    local: Cache<String, FastEntry>,
    shared: Option<DynSharedStore>,
    max_payload_bytes: usize,
}

impl TieredStore {
    /// Create a store whose fast tier holds at most `memory_size_limit`
    /// weight units.
    pub fn new(
        memory_size_limit: u64,
        shared: Option<DynSharedStore>,
        max_payload_bytes: usize,
    ) -> Self {
        let local = Cache::builder()
            .max_capacity(memory_size_limit)
            .weigher(|_key: &String, entry: &FastEntry| entry.policy.weight)
            .expire_after(PolicyExpiry)
            .build();

        Self {
            local,
            shared,
            max_payload_bytes,
        }
    }

    pub fn from_config(config: &CacheConfig, shared: Option<DynSharedStore>) -> Self {
        Self::new(config.memory_size_limit, shared, config.max_payload_bytes)
    }

    /// Whether a shared tier is configured.
    pub fn has_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// Look up the fast tier. A hit renews the entry's sliding window.
    ///
    /// An entry stored under a different type is reported as a miss.
    pub async fn try_get_local<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.local.get(key).await?;
        match entry.value.downcast_ref::<T>() {
            Some(value) => {
                tracing::debug!(key = %key, "cache hit (fast)");
                metrics::record_cache_hit(tier::FAST);
                Some(value.clone())
            }
            None => {
                tracing::debug!(key = %key, "fast tier entry has a different type");
                None
            }
        }
    }

    /// Look up the shared tier, if any.
    ///
    /// Transport and decoding errors are logged and reported as a miss.
    pub async fn try_get_shared<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let shared = self.shared.as_ref()?;

        let payload = match shared.get(key).await {
            Ok(Some(payload)) if !payload.is_empty() => payload,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(key = %key, store = shared.kind(), error = %e, "shared cache read failed");
                metrics::record_shared_error("get");
                return None;
            }
        };

        match decode::<T>(&payload) {
            Ok(value) => {
                tracing::debug!(key = %key, "cache hit (shared)");
                metrics::record_cache_hit(tier::SHARED);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to decode shared cache payload");
                metrics::record_shared_error("decode");
                None
            }
        }
    }

    /// Write to the fast tier only.
    pub async fn set_local<T>(&self, key: &str, value: T, policy: &CacheEntryPolicy)
    where
        T: Send + Sync + 'static,
    {
        let entry = FastEntry {
            value: Arc::new(value),
            policy: *policy,
        };
        self.local.insert(key.to_string(), entry).await;
        metrics::set_cache_entries(self.local.entry_count());
    }

    /// Write to the fast tier, then best-effort to the shared tier.
    ///
    /// Payloads larger than `max_payload_bytes` skip the shared tier.
    pub async fn set<T>(&self, key: &str, value: T, policy: &CacheEntryPolicy)
    where
        T: Serialize + Send + Sync + 'static,
    {
        let payload = self.shared.as_ref().map(|_| encode(&value));
        self.set_local(key, value, policy).await;

        let (Some(shared), Some(payload)) = (self.shared.as_ref(), payload) else {
            return;
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to encode value for shared cache");
                metrics::record_shared_error("encode");
                return;
            }
        };

        if payload.len() > self.max_payload_bytes {
            tracing::debug!(
                key = %key,
                size = payload.len(),
                max = self.max_payload_bytes,
                "payload too large for shared cache, kept in fast tier only"
            );
            metrics::record_shared_skipped();
            return;
        }

        match shared.set(key, &payload, policy).await {
            Ok(()) => tracing::debug!(key = %key, size = payload.len(), "cache set (fast+shared)"),
            Err(e) => {
                tracing::warn!(key = %key, store = shared.kind(), error = %e, "shared cache write failed");
                metrics::record_shared_error("set");
            }
        }
    }

    /// Approximate number of fast tier entries.
    pub fn local_entry_count(&self) -> u64 {
        self.local.entry_count()
    }

    /// Flush the fast tier's pending maintenance (evictions, counts).
    pub async fn run_pending_tasks(&self) {
        self.local.run_pending_tasks().await;
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SharedStoreError> {
    rmp_serde::to_vec_named(value).map_err(|e| SharedStoreError::codec(e.to_string()))
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, SharedStoreError> {
    rmp_serde::from_slice(payload).map_err(|e| SharedStoreError::codec(e.to_string()))
}
