use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::policy::{CacheEntryPolicy, MAX_TTL};

/// Largest accepted expiration setting, in minutes. Matches [`MAX_TTL`].
pub const MAX_EXPIRATION_MINUTES: u64 = MAX_TTL.as_secs() / 60;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the shared (L2) tier.
    /// Default: false (fast tier only, single-instance deployments)
    #[serde(default)]
    pub enable_shared_store: bool,

    /// Fast tier size budget, in entry weight units
    #[serde(default = "default_memory_size_limit")]
    pub memory_size_limit: u64,

    #[serde(default = "default_absolute_expiration_minutes")]
    pub absolute_expiration_minutes: u64,

    #[serde(default = "default_sliding_expiration_minutes")]
    pub sliding_expiration_minutes: u64,

    /// Largest serialized payload written to the shared tier.
    /// Bigger values stay in the fast tier only.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Pre-populate the listing cache at startup
    #[serde(default = "default_warmup_on_startup")]
    pub warmup_on_startup: bool,

    #[serde(default = "default_warmup_page_size")]
    pub warmup_page_size: i32,
}

fn default_memory_size_limit() -> u64 {
    1024
}

fn default_absolute_expiration_minutes() -> u64 {
    10
}

fn default_sliding_expiration_minutes() -> u64 {
    2
}

fn default_max_payload_bytes() -> usize {
    262_144
}

fn default_warmup_on_startup() -> bool {
    true
}

fn default_warmup_page_size() -> i32 {
    200
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_shared_store: false,
            memory_size_limit: default_memory_size_limit(),
            absolute_expiration_minutes: default_absolute_expiration_minutes(),
            sliding_expiration_minutes: default_sliding_expiration_minutes(),
            max_payload_bytes: default_max_payload_bytes(),
            warmup_on_startup: default_warmup_on_startup(),
            warmup_page_size: default_warmup_page_size(),
        }
    }
}

impl CacheConfig {
    /// Policy used by consumers that don't pick their own.
    ///
    /// Both expirations are at least one minute and at most
    /// [`MAX_EXPIRATION_MINUTES`]; weight is 1.
    pub fn default_policy(&self) -> CacheEntryPolicy {
        CacheEntryPolicy::new(
            minutes(self.absolute_expiration_minutes),
            minutes(self.sliding_expiration_minutes),
        )
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.clamp(1, MAX_EXPIRATION_MINUTES) * 60)
}

/// Redis configuration for the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379").
    /// When the shared tier is enabled without a URL, an in-process
    /// store is used instead.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection and command timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Prefix added to every key written to Redis
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

fn default_redis_key_prefix() -> String {
    "estatemap:".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CacheConfig::default();
        assert!(!cfg.enable_shared_store);
        assert_eq!(cfg.memory_size_limit, 1024);
        assert_eq!(cfg.absolute_expiration_minutes, 10);
        assert_eq!(cfg.sliding_expiration_minutes, 2);
        assert_eq!(cfg.max_payload_bytes, 262_144);
        assert!(cfg.warmup_on_startup);
        assert_eq!(cfg.warmup_page_size, 200);
    }

    #[test]
    fn empty_document_uses_field_defaults() {
        let cfg: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.memory_size_limit, 1024);
        let redis: RedisConfig = serde_json::from_str(r#"{"url":"redis://cache:6379"}"#).unwrap();
        assert_eq!(redis.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(redis.key_prefix, "estatemap:");
    }

    #[test]
    fn default_policy_clamps_to_one_minute() {
        let cfg = CacheConfig {
            absolute_expiration_minutes: 0,
            sliding_expiration_minutes: 0,
            ..CacheConfig::default()
        };
        let policy = cfg.default_policy();
        assert_eq!(policy.absolute_expiration, Duration::from_secs(60));
        assert_eq!(policy.sliding_expiration, Duration::from_secs(60));
        assert_eq!(policy.weight, 1);
    }

    #[test]
    fn default_policy_caps_huge_expirations() {
        let cfg = CacheConfig {
            absolute_expiration_minutes: u64::MAX / 10,
            sliding_expiration_minutes: u64::MAX,
            ..CacheConfig::default()
        };
        let policy = cfg.default_policy();
        assert_eq!(policy.absolute_expiration, MAX_TTL);
        assert_eq!(policy.sliding_expiration, MAX_TTL);
        assert!(std::time::Instant::now().checked_add(policy.initial_ttl()).is_some());
    }
}
