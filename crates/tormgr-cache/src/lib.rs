//! Query-result cache with tag-based invalidation, and the token cache.
//!
//! ## Architecture
//!
//! - **Fingerprint**: cache key derived from a query and its arguments
//! - **Tag**: invalidation scope `(table, owner, params)` and its ancestors
//! - **CacheStore**: payload + version under a key, with a TTL
//! - **TagIndex**: tag → cache keys, drained atomically on invalidation
//! - **TokenCache**: cache-aside over the credential store
//!
//! ## Read and write paths
//!
//! ```text
//! read:  fingerprint(query, args) → CacheStore::get → hit
//!                                                   → miss → compute → CacheStore::set
//!                                                                      (registers key under tag.expand())
//! write: system of record → QueryCache::invalidate_after_write(tag)
//!                           → TagIndex drains every ancestor set
//! ```
//!
//! ## Graceful Degradation
//!
//! A cache outage never fails a read: results are computed and served
//! uncached. Token lookups fall through to the credential store.

pub mod backend;
pub mod conditional;
pub mod credentials;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod local;
pub mod metrics;
pub mod query;
pub mod store;
pub mod tag;
pub mod token;

pub use backend::{CacheBackend, Expiry};
pub use conditional::{Conditional, respond};
pub use credentials::{AccessToken, CredentialStore};
pub use error::{CacheError, CacheResult};
pub use fingerprint::fingerprint;
pub use index::TagIndex;
pub use query::{DEFAULT_QUERY_TTL, QueryCache};
pub use store::{CacheStore, Cacheable, ETag};
pub use tag::{MAX_TAG_PARAMS, Tag};
pub use token::{Authenticated, DEFAULT_SWEEP_INTERVAL, TokenCache, spawn_expiry_sweep};
