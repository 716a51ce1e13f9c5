//! Cache metrics.
//!
//! Recorded through the `metrics` facade; without an installed recorder
//! every call is a no-op. Exporting is left to the host process.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_FACTORY_INVOCATIONS_TOTAL: &str = "cache_factory_invocations_total";
    pub const CACHE_SHARED_ERRORS_TOTAL: &str = "cache_shared_errors_total";
    pub const CACHE_SHARED_SKIPPED_TOTAL: &str = "cache_shared_skipped_total";
    pub const CACHE_REGION_INVALIDATIONS_TOTAL: &str = "cache_region_invalidations_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

/// Tier label values.
pub mod tier {
    pub const FAST: &str = "fast";
    pub const SHARED: &str = "shared";
}

/// Record a cache hit.
pub fn record_cache_hit(tier: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier).increment(1);
}

/// Record a miss in every tier.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a factory call made to fill a miss.
pub fn record_factory_invocation(region: &str) {
    counter!(names::CACHE_FACTORY_INVOCATIONS_TOTAL, "region" => region.to_string())
        .increment(1);
}

/// Record a swallowed shared-tier failure.
pub fn record_shared_error(op: &'static str) {
    counter!(names::CACHE_SHARED_ERRORS_TOTAL, "op" => op).increment(1);
}

/// Record a value kept out of the shared tier because of its size.
pub fn record_shared_skipped() {
    counter!(names::CACHE_SHARED_SKIPPED_TOTAL).increment(1);
}

pub fn record_region_invalidation(region: &str) {
    counter!(names::CACHE_REGION_INVALIDATIONS_TOTAL, "region" => region.to_string())
        .increment(1);
}

/// Set the number of fast tier entries.
pub fn set_cache_entries(count: u64) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier::FAST).set(count as f64);
}
