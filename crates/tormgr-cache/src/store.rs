//! Payload + version storage under a fingerprint key.

use std::fmt;
use std::time::Duration;

use crate::backend::{CacheBackend, Expiry};
use crate::error::{CacheError, CacheResult};
use crate::tag::Tag;

pub const DATA_FIELD: &str = "data";
pub const ETAG_FIELD: &str = "etag";

/// Opaque version marker of a cache entry.
///
/// A fresh random value is minted on every write, so two writes of the same
/// payload under the same key never share a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ETag(String);

impl ETag {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty version marks a payload that was never stored.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for ETag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An encoded payload and the version it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cacheable {
    pub bytes: Vec<u8>,
    pub etag: ETag,
}

impl Cacheable {
    /// A payload served without going through the cache.
    pub fn uncached(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            etag: ETag::default(),
        }
    }

    pub fn is_cached(&self) -> bool {
        !self.etag.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    backend: CacheBackend,
}

impl CacheStore {
    pub fn new(backend: CacheBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    /// Read the entry under `key`.
    ///
    /// A missing entry is `Ok(None)`. An entry holding data without a usable
    /// version is malformed and reported as [`CacheError::Encoding`].
    pub async fn get(&self, key: &str) -> CacheResult<Option<Cacheable>> {
        let mut fields = self
            .backend
            .read_fields(key, &[DATA_FIELD, ETAG_FIELD])
            .await?
            .into_iter();

        let (Some(data), etag) = (fields.next().flatten(), fields.next().flatten()) else {
            return Ok(None);
        };

        let etag = match etag.map(String::from_utf8) {
            Some(Ok(etag)) if !etag.is_empty() => ETag(etag),
            Some(Ok(_)) | None => {
                return Err(CacheError::encoding(format!(
                    "cache entry '{key}' has no version"
                )));
            }
            Some(Err(e)) => {
                return Err(CacheError::encoding(format!(
                    "cache entry '{key}' has a non UTF-8 version: {e}"
                )));
            }
        };

        Ok(Some(Cacheable { bytes: data, etag }))
    }

    /// Store `payload` under `key` for `ttl` and register the key under every
    /// ancestor of `tag`. Returns the new version.
    pub async fn set(
        &self,
        key: &str,
        payload: &[u8],
        ttl: Duration,
        tag: &Tag,
    ) -> CacheResult<ETag> {
        let etag = ETag::generate();
        let fields: [(&str, &[u8]); 2] = [
            (DATA_FIELD, payload),
            (ETAG_FIELD, etag.as_str().as_bytes()),
        ];
        self.backend
            .write(key, &fields, Expiry::After(ttl), &tag.expanded_index_keys())
            .await?;
        tracing::debug!(key = %key, tag = %tag, etag = %etag, "cache set");
        Ok(etag)
    }
}
