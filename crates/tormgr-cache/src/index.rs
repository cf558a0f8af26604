//! Reverse index from tags to the cache keys written under them.

use crate::backend::CacheBackend;
use crate::error::CacheResult;
use crate::tag::Tag;

#[derive(Debug, Clone)]
pub struct TagIndex {
    backend: CacheBackend,
}

impl TagIndex {
    pub fn new(backend: CacheBackend) -> Self {
        Self { backend }
    }

    /// Delete every cache entry registered under `tag` or any of its
    /// ancestors, then the reverse-index sets themselves.
    ///
    /// Runs as one atomic step on the backend, so a concurrent `set` either
    /// lands before and is removed, or lands after and survives with its own
    /// registration intact. Idempotent. The returned count is for logging.
    pub async fn invalidate(&self, tag: &Tag) -> CacheResult<u64> {
        self.backend.drain_sets(&tag.expanded_index_keys()).await
    }

    /// Cache keys registered under exactly `tag`.
    pub async fn members(&self, tag: &Tag) -> CacheResult<Vec<String>> {
        self.backend.set_members(&tag.index_key()).await
    }
}
