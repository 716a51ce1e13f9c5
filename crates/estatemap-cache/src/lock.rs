//! Striped per-key locking.
//!
//! Keys are hashed onto a fixed array of async mutexes, so the number of
//! locks stays constant however many keys exist. Unrelated keys that land on
//! the same stripe serialize their slow paths; that false contention is the
//! price for never having to track or evict per-key locks.

use std::hash::{DefaultHasher, Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Default number of stripes.
pub const DEFAULT_STRIPE_COUNT: usize = 64;

/// Held stripe lock. Dropping it releases the stripe.
pub type StripeGuard<'a> = MutexGuard<'a, ()>;

/// The wait for a stripe was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireCancelled;

/// Fixed-size array of mutexes addressed by key hash.
pub struct KeyedMutex {
    stripes: Box<[Mutex<()>]>,
}

impl KeyedMutex {
    pub fn new(stripe_count: usize) -> Self {
        let stripes = (0..stripe_count.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Stripe index for `key`, stable for the lifetime of the process.
    pub fn stripe_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Wait for the stripe owning `key`.
    ///
    /// Returns `Err(AcquireCancelled)` as soon as `cancel` fires; a cancelled
    /// waiter never holds the stripe.
    pub async fn acquire(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<StripeGuard<'_>, AcquireCancelled> {
        let stripe = &self.stripes[self.stripe_for(key)];
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireCancelled),
            guard = stripe.lock() => Ok(guard),
        }
    }

    /// Take the stripe owning `key` only if it is free right now.
    pub fn try_acquire(&self, key: &str) -> Option<StripeGuard<'_>> {
        self.stripes[self.stripe_for(key)].try_lock().ok()
    }
}

impl Default for KeyedMutex {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn stripe_assignment_is_stable_and_bounded() {
        let locks = KeyedMutex::default();
        assert_eq!(locks.stripe_count(), DEFAULT_STRIPE_COUNT);
        for i in 0..1000 {
            let key = format!("cache:region:8:listings:v1:{i}");
            let stripe = locks.stripe_for(&key);
            assert!(stripe < DEFAULT_STRIPE_COUNT);
            assert_eq!(stripe, locks.stripe_for(&key));
        }
    }

    #[test]
    fn zero_stripes_is_clamped_to_one() {
        let locks = KeyedMutex::new(0);
        assert_eq!(locks.stripe_count(), 1);
        assert_eq!(locks.stripe_for("anything"), 0);
    }

    #[tokio::test]
    async fn held_stripe_blocks_same_key() {
        let locks = KeyedMutex::default();
        let cancel = CancellationToken::new();

        let guard = locks.acquire("k", &cancel).await.unwrap();
        assert!(locks.try_acquire("k").is_none());
        drop(guard);
        assert!(locks.try_acquire("k").is_some());
    }

    #[tokio::test]
    async fn cancelled_waiter_gives_up_without_the_lock() {
        let locks = Arc::new(KeyedMutex::default());
        let holder = locks.acquire("k", &CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let locks = locks.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { locks.acquire("k", &cancel).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(AcquireCancelled));

        drop(holder);
        assert!(locks.try_acquire("k").is_some());
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_fast() {
        let locks = KeyedMutex::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(locks.acquire("free", &cancel).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_holder_per_stripe() {
        let locks = Arc::new(KeyedMutex::new(1));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks
                        .acquire(&format!("key-{i}"), &CancellationToken::new())
                        .await
                        .unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
