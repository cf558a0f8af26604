//! Persistent credential store seam.

use async_trait::async_trait;
use time::OffsetDateTime;
use tormgr_core::{Access, RecordId, User};

use crate::error::CacheResult;

/// An access token as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub secret: String,
    pub user_id: RecordId,
    pub access: Access,
    pub expires_at: Option<OffsetDateTime>,
}

impl AccessToken {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Storage of access tokens, the source of truth behind
/// [`TokenCache`](crate::TokenCache).
///
/// Implementations report their own failures as
/// [`CacheError::Store`](crate::CacheError::Store).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an unexpired token and the user it belongs to.
    async fn find_valid(&self, secret: &str) -> CacheResult<Option<(User, AccessToken)>>;

    async fn insert(&self, token: &AccessToken) -> CacheResult<()>;

    /// Delete one token of `user_id`. Returns the number of rows removed.
    async fn delete(&self, user_id: &RecordId, secret: &str) -> CacheResult<u64>;

    /// Delete every token of `user_id`. Returns the number of rows removed.
    async fn delete_all(&self, user_id: &RecordId) -> CacheResult<u64>;

    /// Delete tokens whose expiry has passed. Returns the number of rows removed.
    async fn delete_expired(&self) -> CacheResult<u64>;
}
