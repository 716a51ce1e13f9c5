use std::time::{Duration, Instant};

use moka::Expiry;

/// Longest lifetime any entry can get, in either tier.
///
/// Larger expirations are clamped to this so deadlines stay representable
/// as `Instant`s and as Redis millisecond TTLs.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Expiration and weight applied to a single cache entry.
///
/// The same policy is applied independently in each tier: the fast tier uses
/// `weight` for capacity accounting, the shared tier ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryPolicy {
    /// Hard lifetime measured from the write.
    pub absolute_expiration: Duration,
    /// Idle lifetime, renewed on every read. `Duration::ZERO` disables it.
    pub sliding_expiration: Duration,
    /// Units charged against the fast tier's size budget.
    pub weight: u32,
}

impl CacheEntryPolicy {
    /// Both expirations are clamped to [`MAX_TTL`].
    pub fn new(absolute_expiration: Duration, sliding_expiration: Duration) -> Self {
        Self {
            absolute_expiration: absolute_expiration.min(MAX_TTL),
            sliding_expiration: sliding_expiration.min(MAX_TTL),
            weight: 1,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Lifetime granted to a freshly written entry.
    pub fn initial_ttl(&self) -> Duration {
        self.ttl_after(Duration::ZERO)
    }

    /// Remaining lifetime for an entry of the given age that was just read.
    pub fn ttl_after(&self, age: Duration) -> Duration {
        let remaining = self.absolute().saturating_sub(age);
        if self.sliding_expiration.is_zero() {
            remaining
        } else {
            remaining.min(self.sliding())
        }
    }

    /// Absolute expiration, at most [`MAX_TTL`].
    pub fn absolute(&self) -> Duration {
        self.absolute_expiration.min(MAX_TTL)
    }

    /// Sliding window, at most [`MAX_TTL`]. Zero means none.
    pub fn sliding(&self) -> Duration {
        self.sliding_expiration.min(MAX_TTL)
    }
}

/// A cached value that carries its own policy.
pub(crate) trait PolicyEntry {
    fn policy(&self) -> &CacheEntryPolicy;
}

/// moka expiry driven by each entry's own policy: `min(absolute, sliding)`
/// after a write, `min(sliding, absolute - age)` after a read.
pub(crate) struct PolicyExpiry;

impl<V: PolicyEntry> Expiry<String, V> for PolicyExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &V,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.policy().initial_ttl())
    }

    fn expire_after_read(
        &self,
        _key: &String,
        entry: &V,
        read_at: Instant,
        _duration_until_expiry: Option<Duration>,
        last_modified_at: Instant,
    ) -> Option<Duration> {
        Some(
            entry
                .policy()
                .ttl_after(read_at.saturating_duration_since(last_modified_at)),
        )
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &V,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.policy().initial_ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_caps_ttl() {
        let policy = CacheEntryPolicy::new(Duration::from_secs(600), Duration::from_secs(120));
        assert_eq!(policy.initial_ttl(), Duration::from_secs(120));
        assert_eq!(policy.ttl_after(Duration::from_secs(500)), Duration::from_secs(100));
        assert_eq!(policy.ttl_after(Duration::from_secs(700)), Duration::ZERO);
    }

    #[test]
    fn zero_sliding_means_absolute_only() {
        let policy = CacheEntryPolicy::new(Duration::from_secs(60), Duration::ZERO);
        assert_eq!(policy.initial_ttl(), Duration::from_secs(60));
        assert_eq!(policy.ttl_after(Duration::from_secs(15)), Duration::from_secs(45));
    }

    #[test]
    fn huge_expirations_are_clamped() {
        let policy = CacheEntryPolicy::new(Duration::MAX, Duration::MAX);
        assert_eq!(policy.absolute_expiration, MAX_TTL);
        assert_eq!(policy.initial_ttl(), MAX_TTL);

        // Struct literals bypass `new`, the accessors still clamp.
        let literal = CacheEntryPolicy {
            absolute_expiration: Duration::MAX,
            sliding_expiration: Duration::ZERO,
            weight: 1,
        };
        assert_eq!(literal.initial_ttl(), MAX_TTL);
        assert!(Instant::now().checked_add(literal.initial_ttl()).is_some());
        assert!(i64::try_from(literal.absolute().as_millis()).is_ok());
    }
}
