//! Cache-aside facade used by entity handlers.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};
use crate::fingerprint::fingerprint;
use crate::index::TagIndex;
use crate::metrics;
use crate::store::{CacheStore, Cacheable};
use crate::tag::Tag;

pub const DEFAULT_QUERY_TTL: Duration = Duration::from_secs(3600);

/// Query-result cache with tag-based invalidation.
///
/// Reads go through [`fetch_or_compute`](Self::fetch_or_compute); every write
/// to the system of record is followed by
/// [`invalidate_after_write`](Self::invalidate_after_write).
#[derive(Debug, Clone)]
pub struct QueryCache {
    store: CacheStore,
    index: TagIndex,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        Self {
            store: CacheStore::new(backend.clone()),
            index: TagIndex::new(backend),
            ttl,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Serve the result of `query` with `args` from the cache, or compute,
    /// encode and cache it under `tag`.
    ///
    /// A cache outage never fails the read: the computed value is returned
    /// uncached (empty version). Only a failing `compute` or a value that
    /// cannot be serialized is an error.
    pub async fn fetch_or_compute<T, E, F, Fut>(
        &self,
        tag: &Tag,
        query: &str,
        args: &[&(dyn Display + Sync)],
        compute: F,
    ) -> Result<Cacheable, E>
    where
        T: Serialize,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = fingerprint(query, args);

        let cache_usable = match self.store.get(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(key = %key, "cache hit");
                metrics::record_cache_hit(metrics::QUERY);
                return Ok(hit);
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                metrics::record_cache_miss(metrics::QUERY);
                true
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!(key = %key, error = %e, "cache unavailable, computing directly");
                metrics::record_cache_error(metrics::QUERY);
                false
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding malformed cache entry");
                metrics::record_cache_error(metrics::QUERY);
                true
            }
        };

        let value = compute().await?;
        let bytes = serde_json::to_vec(&value).map_err(CacheError::from)?;

        if !cache_usable {
            return Ok(Cacheable::uncached(bytes));
        }

        match self.store.set(&key, &bytes, self.ttl, tag).await {
            Ok(etag) => Ok(Cacheable { bytes, etag }),
            Err(e) => {
                tracing::warn!(key = %key, tag = %tag, error = %e, "failed to cache query result");
                metrics::record_cache_error(metrics::QUERY);
                Ok(Cacheable::uncached(bytes))
            }
        }
    }

    /// Drop every cached read that may depend on `tag`.
    ///
    /// Failures are logged and returned; the entries' TTL is the backstop, so
    /// callers should not retry inline.
    pub async fn invalidate_after_write(&self, tag: &Tag) -> CacheResult<u64> {
        match self.index.invalidate(tag).await {
            Ok(removed) => {
                tracing::debug!(tag = %tag, removed, "cache invalidated");
                metrics::record_invalidated(removed);
                Ok(removed)
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "cache invalidation failed");
                metrics::record_cache_error(metrics::QUERY);
                Err(e)
            }
        }
    }
}
