//! Integration tests for the Redis cache backend.
//!
//! The transactional `set` and the invalidation script only exist in Redis
//! mode, so these run against a real Redis started with testcontainers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Runtime};
use parking_lot::Mutex;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tormgr_cache::{
    AccessToken, CacheBackend, CacheResult, CacheStore, CredentialStore, QueryCache, Tag,
    TagIndex, TokenCache, fingerprint,
};
use tormgr_core::{Access, RecordId, User};

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_backend() -> CacheBackend {
    let pool = Config::from_url(get_redis_url().await)
        .create_pool(Some(Runtime::Tokio1))
        .expect("create redis pool");
    CacheBackend::new_redis(pool)
}

/// Each test works under its own owner so the shared container needs no flush.
fn unique_owner() -> String {
    RecordId::generate().into_inner()
}

#[tokio::test]
async fn test_redis_backend_is_available() {
    let backend = redis_backend().await;
    assert_eq!(backend.mode(), "redis");
    assert!(backend.is_available().await);
}

#[tokio::test]
async fn test_set_then_get_returns_same_version() {
    let store = CacheStore::new(redis_backend().await);
    let key = fingerprint("SELECT 1", &[&unique_owner()]);
    let tag = Tag::new("folders", unique_owner());

    let etag = store
        .set(&key, b"{\"a\":1}", Duration::from_secs(60), &tag)
        .await
        .unwrap();
    let entry = store.get(&key).await.unwrap().expect("cached");

    assert_eq!(entry.bytes, b"{\"a\":1}");
    assert_eq!(entry.etag, etag);

    let again = store
        .set(&key, b"{\"a\":1}", Duration::from_secs(60), &tag)
        .await
        .unwrap();
    assert_ne!(again, etag);
}

#[tokio::test]
async fn test_entries_expire() {
    let store = CacheStore::new(redis_backend().await);
    let key = fingerprint("SELECT 2", &[&unique_owner()]);
    store
        .set(
            &key,
            b"x",
            Duration::from_millis(100),
            &Tag::new("folders", unique_owner()),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalidation_covers_hierarchy_and_is_idempotent() {
    let backend = redis_backend().await;
    let store = CacheStore::new(backend.clone());
    let index = TagIndex::new(backend);
    let owner = unique_owner();
    let ttl = Duration::from_secs(60);

    let bare = Tag::new("folders", &owner);
    let specific = bare.clone().with_param("id", "5").unwrap();
    let other_owner = Tag::new("folders", unique_owner());

    let list_key = fingerprint("list", &[&owner]);
    let one_key = fingerprint("one", &[&owner, &5]);
    let foreign_key = fingerprint("list", &[&other_owner.owner()]);
    store.set(&list_key, b"[]", ttl, &bare).await.unwrap();
    store.set(&one_key, b"{}", ttl, &specific).await.unwrap();
    store.set(&foreign_key, b"[]", ttl, &other_owner).await.unwrap();

    assert_eq!(index.invalidate(&specific).await.unwrap(), 2);
    assert!(store.get(&list_key).await.unwrap().is_none());
    assert!(store.get(&one_key).await.unwrap().is_none());
    assert!(store.get(&foreign_key).await.unwrap().is_some());
    assert!(index.members(&bare).await.unwrap().is_empty());

    assert_eq!(index.invalidate(&specific).await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalidation_of_large_index() {
    let backend = redis_backend().await;
    let store = CacheStore::new(backend.clone());
    let index = TagIndex::new(backend);
    let tag = Tag::new("torrents", unique_owner());

    for i in 0..2500 {
        let key = fingerprint("torrent", &[&tag.owner(), &i]);
        store
            .set(&key, b"{}", Duration::from_secs(60), &tag)
            .await
            .unwrap();
    }

    assert_eq!(index.invalidate(&tag).await.unwrap(), 2500);
    assert!(index.members(&tag).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sets_and_invalidations_keep_live_keys_indexed() {
    let backend = redis_backend().await;
    let store = CacheStore::new(backend.clone());
    let index = TagIndex::new(backend);
    let owner = unique_owner();
    let bare = Tag::new("folders", &owner);
    let key_of = |k: u32| format!("q.{owner}.{k}");

    let mut tasks = tokio::task::JoinSet::new();
    for k in 0..200 {
        let store = store.clone();
        let key = key_of(k);
        let tag = bare.clone().with_param("id", k).unwrap();
        tasks.spawn(async move {
            store
                .set(&key, b"{}", Duration::from_secs(60), &tag)
                .await
                .map(drop)
        });
        if k % 5 == 0 {
            let index = index.clone();
            let bare = bare.clone();
            tasks.spawn(async move { index.invalidate(&bare).await.map(drop) });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    // Any entry that survived must still be reachable from the bare tag.
    let members = index.members(&bare).await.unwrap();
    for k in 0..200 {
        let key = key_of(k);
        if store.get(&key).await.unwrap().is_some() {
            assert!(members.contains(&key), "{key} is live but unindexed");
        }
    }

    index.invalidate(&bare).await.unwrap();
}

#[tokio::test]
async fn test_query_cache_recomputes_after_invalidation() {
    let cache = QueryCache::new(redis_backend().await, Duration::from_secs(60));
    let owner = unique_owner();
    let tag = Tag::new("folders", &owner);
    let name = Arc::new(Mutex::new("Movies".to_string()));

    let read = || {
        let name = name.clone();
        let owner = owner.clone();
        let tag = tag.clone();
        let cache = cache.clone();
        async move {
            cache
                .fetch_or_compute(&tag, "list folders", &[&owner], || async move {
                    Ok::<_, tormgr_cache::CacheError>(vec![name.lock().clone()])
                })
                .await
                .unwrap()
        }
    };

    let first = read().await;
    *name.lock() = "Films".to_string();
    assert_eq!(read().await, first);

    let folder = Tag::new("folders", &owner).with_param("id", "f1").unwrap();
    cache.invalidate_after_write(&folder).await.unwrap();

    let after = read().await;
    assert_eq!(after.bytes, b"[\"Films\"]");
    assert_ne!(after.etag, first.etag);
}

#[derive(Default)]
struct MemoryCredentialStore {
    tokens: Mutex<HashMap<String, (User, AccessToken)>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_valid(&self, secret: &str) -> CacheResult<Option<(User, AccessToken)>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .tokens
            .lock()
            .get(secret)
            .filter(|(_, token)| !token.is_expired(now))
            .cloned())
    }

    async fn insert(&self, token: &AccessToken) -> CacheResult<()> {
        let user = User {
            id: token.user_id.clone(),
            email: format!("{}@example.com", token.user_id),
        };
        self.tokens
            .lock()
            .insert(token.secret.clone(), (user, token.clone()));
        Ok(())
    }

    async fn delete(&self, user_id: &RecordId, secret: &str) -> CacheResult<u64> {
        let mut tokens = self.tokens.lock();
        let owned = tokens
            .get(secret)
            .is_some_and(|(_, token)| &token.user_id == user_id);
        Ok(if owned && tokens.remove(secret).is_some() { 1 } else { 0 })
    }

    async fn delete_all(&self, user_id: &RecordId) -> CacheResult<u64> {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, (_, token)| &token.user_id != user_id);
        Ok((before - tokens.len()) as u64)
    }

    async fn delete_expired(&self) -> CacheResult<u64> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_token_revoke_all_through_redis() {
    let store = Arc::new(MemoryCredentialStore::default());
    let cache = TokenCache::new(redis_backend().await, store.clone());
    let user = User {
        id: RecordId::generate(),
        email: "u1@example.com".into(),
    };

    let mut secrets = Vec::new();
    for _ in 0..3 {
        secrets.push(cache.issue(&user, Access::ReadWrite, None).await.unwrap());
    }
    for secret in &secrets {
        let found = cache.authenticate(secret).await.unwrap().expect("valid");
        assert_eq!(found.user.id, user.id);
    }

    assert_eq!(cache.revoke_all(&user.id).await.unwrap(), 3);
    for secret in &secrets {
        assert!(cache.authenticate(secret).await.unwrap().is_none());
    }
    assert!(store.tokens.lock().is_empty());
}

#[tokio::test]
async fn test_token_cache_expires_with_token() {
    let store = Arc::new(MemoryCredentialStore::default());
    let cache = TokenCache::new(redis_backend().await, store.clone());
    let user = User {
        id: RecordId::generate(),
        email: "u2@example.com".into(),
    };

    let secret = cache
        .issue(&user, Access::Read, Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(cache.authenticate(&secret).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.authenticate(&secret).await.unwrap().is_none());
}
