//! Cache-aside layer over the credential store.
//!
//! Each authenticated token is cached as a hash under `token.<secret>` with
//! the serialized user and the access bits, and listed in the per-user set
//! `tokenlist.<user id>` so that all of a user's tokens can be dropped at once.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tormgr_core::{Access, RecordId, User};

use crate::backend::{CacheBackend, Expiry};
use crate::credentials::{AccessToken, CredentialStore};
use crate::error::{CacheError, CacheResult};
use crate::metrics;

pub const TOKEN_KEY_PREFIX: &str = "token.";
pub const TOKEN_LIST_KEY_PREFIX: &str = "tokenlist.";
pub const USER_FIELD: &str = "user";
pub const ACCESS_FIELD: &str = "access";

/// Random bytes in a token secret, before encoding.
pub const SECRET_SIZE: usize = 32;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

pub fn token_key(secret: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{secret}")
}

pub fn token_list_key(user_id: &RecordId) -> String {
    format!("{TOKEN_LIST_KEY_PREFIX}{user_id}")
}

/// The principal behind a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub user: User,
    pub access: Access,
}

#[derive(Clone)]
pub struct TokenCache {
    backend: CacheBackend,
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(backend: CacheBackend, store: Arc<dyn CredentialStore>) -> Self {
        Self { backend, store }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Create a token for `user`, valid for `lifetime` or forever.
    ///
    /// The token is persisted first; failing to cache it afterwards is only
    /// logged since the next lookup repopulates the cache.
    pub async fn issue(
        &self,
        user: &User,
        access: Access,
        lifetime: Option<Duration>,
    ) -> CacheResult<String> {
        let token = AccessToken {
            secret: generate_secret(&user.id),
            user_id: user.id.clone(),
            access,
            expires_at: lifetime.map(|lifetime| OffsetDateTime::now_utc() + lifetime),
        };
        self.store.insert(&token).await?;

        if let Err(e) = self.remember(user, &token).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to cache new token");
            metrics::record_cache_error(metrics::TOKEN);
        }
        tracing::debug!(user_id = %user.id, access = %access, "token issued");
        Ok(token.secret)
    }

    /// Resolve `secret` to its user and access level.
    ///
    /// `Ok(None)` means the token is unknown or expired. An unreachable cache
    /// falls through to the credential store; any other failure is returned so
    /// the caller can answer "unable to verify" instead of guessing.
    pub async fn authenticate(&self, secret: &str) -> CacheResult<Option<Authenticated>> {
        let cache_usable = match self.lookup_cached(secret).await {
            Ok(Some(found)) => {
                metrics::record_cache_hit(metrics::TOKEN);
                return Ok(Some(found));
            }
            Ok(None) => {
                metrics::record_cache_miss(metrics::TOKEN);
                true
            }
            Err(e) if e.is_unavailable() => {
                tracing::warn!(error = %e, "token cache unavailable, using credential store");
                metrics::record_cache_error(metrics::TOKEN);
                false
            }
            Err(e) => {
                metrics::record_cache_error(metrics::TOKEN);
                return Err(e);
            }
        };

        let Some((user, token)) = self.store.find_valid(secret).await? else {
            return Ok(None);
        };

        if cache_usable && let Err(e) = self.remember(&user, &token).await {
            tracing::warn!(user_id = %user.id, error = %e, "failed to cache token");
            metrics::record_cache_error(metrics::TOKEN);
        }

        Ok(Some(Authenticated {
            user,
            access: token.access,
        }))
    }

    /// Revoke one token of `user_id`. Returns whether a stored token was removed.
    ///
    /// The cache entry goes first, then the row. A reader racing in between
    /// can repopulate the cache from the not yet deleted row; that entry then
    /// lives until its own expiry or the user's next revoke-all.
    pub async fn revoke(&self, user_id: &RecordId, secret: &str) -> CacheResult<bool> {
        self.backend
            .remove(&token_key(secret), &token_list_key(user_id))
            .await?;
        let removed = self.store.delete(user_id, secret).await?;
        tracing::debug!(user_id = %user_id, removed, "token revoked");
        Ok(removed > 0)
    }

    /// Revoke every token of `user_id`. Returns the number of stored tokens removed.
    pub async fn revoke_all(&self, user_id: &RecordId) -> CacheResult<u64> {
        let evicted = self
            .backend
            .drain_sets(&[token_list_key(user_id)])
            .await?;
        let removed = self.store.delete_all(user_id).await?;
        tracing::debug!(user_id = %user_id, evicted, removed, "all tokens revoked");
        Ok(removed)
    }

    async fn lookup_cached(&self, secret: &str) -> CacheResult<Option<Authenticated>> {
        let key = token_key(secret);
        let mut fields = self
            .backend
            .read_fields(&key, &[USER_FIELD, ACCESS_FIELD])
            .await?
            .into_iter();

        let (user, access) = match (fields.next().flatten(), fields.next().flatten()) {
            (Some(user), Some(access)) => (user, access),
            (None, None) => return Ok(None),
            _ => {
                return Err(CacheError::encoding(format!(
                    "cache entry '{key}' is incomplete"
                )));
            }
        };

        let user: User = serde_json::from_slice(&user)?;
        let access = std::str::from_utf8(&access)
            .ok()
            .and_then(|bits| bits.parse::<i32>().ok())
            .and_then(Access::from_bits)
            .ok_or_else(|| CacheError::encoding(format!("cache entry '{key}' has bad access")))?;

        Ok(Some(Authenticated { user, access }))
    }

    async fn remember(&self, user: &User, token: &AccessToken) -> CacheResult<()> {
        let user_json = serde_json::to_vec(user)?;
        let access = token.access.bits().to_string();
        let fields: [(&str, &[u8]); 2] = [
            (USER_FIELD, user_json.as_slice()),
            (ACCESS_FIELD, access.as_bytes()),
        ];
        let expiry = token.expires_at.map_or(Expiry::Never, Expiry::At);

        self.backend
            .write(
                &token_key(&token.secret),
                &fields,
                expiry,
                &[token_list_key(&token.user_id)],
            )
            .await
    }
}

/// `<user id>:<random>`, the random part URL-safe base64 without padding.
fn generate_secret(user_id: &RecordId) -> String {
    let mut bytes = [0u8; SECRET_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{user_id}:{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Periodically delete expired tokens from the credential store.
///
/// Cached copies carry the token's own expiry and need no sweeping. The first
/// run happens one `period` after start.
pub fn spawn_expiry_sweep(store: Arc<dyn CredentialStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            match store.delete_expired().await {
                Ok(removed) => tracing::info!(removed, "expired tokens swept"),
                Err(e) => tracing::error!(error = %e, "failed to sweep expired tokens"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::unreachable_redis;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Credential store kept in memory.
    #[derive(Default)]
    struct MemoryCredentialStore {
        users: Mutex<HashMap<RecordId, User>>,
        tokens: Mutex<HashMap<String, AccessToken>>,
        lookups: Mutex<usize>,
        offline: Mutex<bool>,
    }

    impl MemoryCredentialStore {
        fn with_user(user: &User) -> Arc<Self> {
            let store = Self::default();
            store.users.lock().insert(user.id.clone(), user.clone());
            Arc::new(store)
        }

        fn rows_for(&self, user_id: &RecordId) -> usize {
            self.tokens
                .lock()
                .values()
                .filter(|t| &t.user_id == user_id)
                .count()
        }

        fn check_online(&self) -> CacheResult<()> {
            if *self.offline.lock() {
                return Err(CacheError::store("connection refused"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryCredentialStore {
        async fn find_valid(&self, secret: &str) -> CacheResult<Option<(User, AccessToken)>> {
            self.check_online()?;
            *self.lookups.lock() += 1;
            let now = OffsetDateTime::now_utc();
            let Some(token) = self.tokens.lock().get(secret).cloned() else {
                return Ok(None);
            };
            if token.is_expired(now) {
                return Ok(None);
            }
            let user = self.users.lock().get(&token.user_id).cloned();
            Ok(user.map(|user| (user, token)))
        }

        async fn insert(&self, token: &AccessToken) -> CacheResult<()> {
            self.check_online()?;
            self.tokens.lock().insert(token.secret.clone(), token.clone());
            Ok(())
        }

        async fn delete(&self, user_id: &RecordId, secret: &str) -> CacheResult<u64> {
            self.check_online()?;
            let mut tokens = self.tokens.lock();
            match tokens.get(secret) {
                Some(t) if &t.user_id == user_id => {
                    tokens.remove(secret);
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        async fn delete_all(&self, user_id: &RecordId) -> CacheResult<u64> {
            self.check_online()?;
            let mut tokens = self.tokens.lock();
            let before = tokens.len();
            tokens.retain(|_, t| &t.user_id != user_id);
            Ok((before - tokens.len()) as u64)
        }

        async fn delete_expired(&self) -> CacheResult<u64> {
            self.check_online()?;
            let now = OffsetDateTime::now_utc();
            let mut tokens = self.tokens.lock();
            let before = tokens.len();
            tokens.retain(|_, t| !t.is_expired(now));
            Ok((before - tokens.len()) as u64)
        }
    }

    fn user(id: &str) -> User {
        User {
            id: RecordId::parse(id).unwrap(),
            email: format!("{id}@example.com"),
        }
    }

    #[test]
    fn secret_is_prefixed_with_user_id() {
        let u1 = user("u1");
        let secret = generate_secret(&u1.id);
        let (prefix, random) = secret.split_once(':').unwrap();
        assert_eq!(prefix, "u1");
        assert_eq!(URL_SAFE_NO_PAD.decode(random).unwrap().len(), SECRET_SIZE);
        assert_ne!(secret, generate_secret(&u1.id));
    }

    #[tokio::test]
    async fn issued_token_authenticates_from_cache() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        let cache = TokenCache::new(CacheBackend::new_local(), store.clone());

        let secret = cache.issue(&u1, Access::Read, None).await.unwrap();
        let found = cache.authenticate(&secret).await.unwrap().unwrap();

        assert_eq!(found.user, u1);
        assert_eq!(found.access, Access::Read);
        assert_eq!(*store.lookups.lock(), 0);
    }

    #[tokio::test]
    async fn cache_miss_populates_from_store() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        let backend = CacheBackend::new_local();
        let secret = TokenCache::new(CacheBackend::new_local(), store.clone())
            .issue(&u1, Access::ReadWrite, None)
            .await
            .unwrap();

        let cache = TokenCache::new(backend.clone(), store.clone());
        assert!(cache.authenticate(&secret).await.unwrap().is_some());
        assert!(cache.authenticate(&secret).await.unwrap().is_some());
        assert_eq!(*store.lookups.lock(), 1);
        assert_eq!(
            backend.set_members(&token_list_key(&u1.id)).await.unwrap(),
            vec![token_key(&secret)]
        );
    }

    #[tokio::test]
    async fn unknown_secret_is_not_found() {
        let store = MemoryCredentialStore::with_user(&user("u1"));
        let cache = TokenCache::new(CacheBackend::new_local(), store);
        assert!(cache.authenticate("u1:nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_not_found() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        let cache = TokenCache::new(CacheBackend::new_local(), store);

        let secret = cache
            .issue(&u1, Access::Read, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.authenticate(&secret).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_all_removes_every_token() {
        let u1 = user("u1");
        let u2 = user("u2");
        let store = MemoryCredentialStore::with_user(&u1);
        store.users.lock().insert(u2.id.clone(), u2.clone());
        let cache = TokenCache::new(CacheBackend::new_local(), store.clone());

        let mut secrets = Vec::new();
        for _ in 0..3 {
            secrets.push(cache.issue(&u1, Access::ReadWrite, None).await.unwrap());
        }
        let other = cache.issue(&u2, Access::Read, None).await.unwrap();

        assert_eq!(cache.revoke_all(&u1.id).await.unwrap(), 3);
        for secret in &secrets {
            assert!(cache.authenticate(secret).await.unwrap().is_none());
        }
        assert_eq!(store.rows_for(&u1.id), 0);
        assert!(cache.authenticate(&other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_removes_single_token() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        let cache = TokenCache::new(CacheBackend::new_local(), store.clone());
        let kept = cache.issue(&u1, Access::Read, None).await.unwrap();
        let gone = cache.issue(&u1, Access::Read, None).await.unwrap();

        assert!(cache.revoke(&u1.id, &gone).await.unwrap());
        assert!(!cache.revoke(&u1.id, &gone).await.unwrap());
        assert!(cache.authenticate(&gone).await.unwrap().is_none());
        assert!(cache.authenticate(&kept).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_is_scoped_to_owner() {
        let u1 = user("u1");
        let u2 = user("u2");
        let store = MemoryCredentialStore::with_user(&u1);
        let cache = TokenCache::new(CacheBackend::new_local(), store);
        let secret = cache.issue(&u1, Access::Read, None).await.unwrap();

        assert!(!cache.revoke(&u2.id, &secret).await.unwrap());
        // Only the cached copy is dropped; the row survives.
        assert!(cache.authenticate(&secret).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cache_outage_falls_through_to_store() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        let secret = TokenCache::new(CacheBackend::new_local(), store.clone())
            .issue(&u1, Access::Write, None)
            .await
            .unwrap();

        let cache = TokenCache::new(unreachable_redis(), store);
        let found = cache.authenticate(&secret).await.unwrap().unwrap();
        assert_eq!(found.access, Access::Write);
    }

    #[tokio::test]
    async fn store_failure_after_miss_is_an_error() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        *store.offline.lock() = true;
        let cache = TokenCache::new(CacheBackend::new_local(), store);

        let err = cache.authenticate("u1:whatever").await.unwrap_err();
        assert!(matches!(err, CacheError::Store(_)), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_cached_token_is_an_error() {
        let backend = CacheBackend::new_local();
        backend
            .write(
                &token_key("u1:bad"),
                &[(USER_FIELD, b"{not json".as_slice()), (ACCESS_FIELD, b"3".as_slice())],
                Expiry::Never,
                &[],
            )
            .await
            .unwrap();
        let cache = TokenCache::new(backend, MemoryCredentialStore::with_user(&user("u1")));

        let err = cache.authenticate("u1:bad").await.unwrap_err();
        assert!(matches!(err, CacheError::Encoding(_)), "{err:?}");
    }

    #[tokio::test]
    async fn sweep_deletes_expired_rows() {
        let u1 = user("u1");
        let store = MemoryCredentialStore::with_user(&u1);
        store.tokens.lock().insert(
            "u1:old".into(),
            AccessToken {
                secret: "u1:old".into(),
                user_id: u1.id.clone(),
                access: Access::Read,
                expires_at: Some(OffsetDateTime::now_utc() - time::Duration::hours(1)),
            },
        );

        let handle = spawn_expiry_sweep(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.rows_for(&u1.id), 0);
        handle.abort();
    }
}
