use thiserror::Error;

use crate::tag::MAX_TAG_PARAMS;

/// Errors raised by the cache layer.
///
/// A plain cache or store miss is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend could not be reached or rejected the command.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// A payload could not be serialized, or a stored entry is malformed.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A tag was built with more named parameters than the expansion allows.
    #[error("Tag for table '{table}' has {count} parameters, at most {max} allowed", max = MAX_TAG_PARAMS)]
    ExpansionOverflow { table: String, count: usize },

    /// The persistent credential store failed.
    #[error("Credential store error: {0}")]
    Store(String),
}

impl CacheError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding(reason.into())
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store(reason.into())
    }

    /// Whether the failure is a backend outage the caller may degrade around.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Unavailable(format!("failed to get Redis connection: {e}"))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
