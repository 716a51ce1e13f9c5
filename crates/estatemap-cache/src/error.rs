use thiserror::Error;

/// Error returned by [`HybridCache::get_or_create`](crate::HybridCache::get_or_create).
///
/// Shared-store failures never show up here: they are logged and treated as
/// misses. Callers only ever see their own factory error or a cancellation.
#[derive(Debug, Error)]
pub enum CacheError<E> {
    #[error("cache operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Factory(E),
}

impl<E> CacheError<E> {
    /// Returns `true` if the call was aborted by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the factory error, if this is one.
    pub fn into_factory(self) -> Option<E> {
        match self {
            Self::Factory(e) => Some(e),
            Self::Cancelled => None,
        }
    }

    /// Maps the factory error, keeping cancellation as is.
    pub fn map_factory<F>(self, f: impl FnOnce(E) -> F) -> CacheError<F> {
        match self {
            Self::Factory(e) => CacheError::Factory(f(e)),
            Self::Cancelled => CacheError::Cancelled,
        }
    }
}

/// Failure talking to the shared (out-of-process) tier.
///
/// Internal to the crate's best-effort paths; every call site converts it
/// into a miss or a no-op plus a `warn!` event.
#[derive(Debug, Error)]
pub enum SharedStoreError {
    #[error("failed to get shared store connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("shared store command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("shared store operation timed out after {0} ms")]
    Timeout(u64),

    #[error("shared store payload codec error: {0}")]
    Codec(String),
}

impl SharedStoreError {
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_error_is_transparent() {
        let err: CacheError<std::io::Error> =
            CacheError::Factory(std::io::Error::other("db down"));
        assert_eq!(err.to_string(), "db down");
        assert!(!err.is_cancelled());
    }

    #[test]
    fn map_factory_keeps_cancellation() {
        let err: CacheError<String> = CacheError::Cancelled;
        let mapped = err.map_factory(|s| s.len());
        assert!(mapped.is_cancelled());
        assert!(mapped.into_factory().is_none());
    }
}
