//! Cache backend with a local mode and a shared Redis mode.
//!
//! Both modes expose the same handful of primitives: hash entries with an
//! expiry, and sets of keys that can be drained atomically. Everything the
//! query cache and the token cache do is expressed in these terms.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use deadpool_redis::Pool;
use time::OffsetDateTime;

use crate::error::CacheResult;
use crate::local::LocalStore;

/// Deletes every member of each set passed as KEYS, then the sets.
///
/// Members are deleted in chunks so that `unpack` stays within Lua's stack
/// limit. Returns the number of keys actually removed.
const DRAIN_SETS_SCRIPT: &str = r#"
local removed = 0
for _, set in ipairs(KEYS) do
  local members = redis.call('SMEMBERS', set)
  for first = 1, #members, 1000 do
    local last = math.min(first + 999, #members)
    removed = removed + redis.call('DEL', unpack(members, first, last))
  end
  redis.call('DEL', set)
end
return removed
"#;

static DRAIN_SETS: LazyLock<redis::Script> =
    LazyLock::new(|| redis::Script::new(DRAIN_SETS_SCRIPT));

/// When a cache entry stops being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    After(Duration),
    At(OffsetDateTime),
    Never,
}

/// Where cache entries live.
///
/// ## Cache Modes
///
/// - **Local**: single-instance mode, state held in process memory
/// - **Redis**: multi-instance mode, state shared through Redis
///
/// Multi-key operations are atomic in both modes: a local backend holds one
/// lock for the whole operation, a Redis backend uses MULTI/EXEC or a script.
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<LocalStore>),
    Redis(Pool),
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CacheBackend").field(&self.mode()).finish()
    }
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(LocalStore::new()))
    }

    pub fn new_redis(pool: Pool) -> Self {
        CacheBackend::Redis(pool)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }

    /// Whether the backend can currently serve requests.
    pub async fn is_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => true,
            CacheBackend::Redis(pool) => {
                let Ok(mut conn) = pool.get().await else {
                    return false;
                };
                redis::cmd("PING")
                    .query_async::<String>(&mut conn)
                    .await
                    .is_ok()
            }
        }
    }

    /// Drop expired local entries. Redis expires keys on its own.
    pub fn cleanup_expired(&self) -> usize {
        match self {
            CacheBackend::Local(store) => store.cleanup_expired(),
            CacheBackend::Redis(_) => 0,
        }
    }

    /// Number of live entries, when the backend can tell cheaply.
    pub fn local_entries(&self) -> Option<usize> {
        match self {
            CacheBackend::Local(store) => Some(store.len()),
            CacheBackend::Redis(_) => None,
        }
    }

    pub(crate) async fn read_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> CacheResult<Vec<Option<Vec<u8>>>> {
        match self {
            CacheBackend::Local(store) => Ok(store.read_fields(key, fields)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let values: Vec<Option<Vec<u8>>> = redis::cmd("HMGET")
                    .arg(key)
                    .arg(fields)
                    .query_async(&mut conn)
                    .await?;
                Ok(values)
            }
        }
    }

    /// Replace the hash at `key` with `fields` and register `key` in `sets`,
    /// as one atomic step.
    pub(crate) async fn write(
        &self,
        key: &str,
        fields: &[(&str, &[u8])],
        expiry: Expiry,
        sets: &[String],
    ) -> CacheResult<()> {
        match self {
            CacheBackend::Local(store) => {
                store.write(key, fields, expiry, sets);
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .del(key)
                    .ignore()
                    .hset_multiple(key, fields)
                    .ignore();
                match expiry {
                    Expiry::After(ttl) => {
                        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
                        pipe.pexpire(key, millis).ignore();
                    }
                    Expiry::At(at) => {
                        let millis = (at.unix_timestamp_nanos() / 1_000_000) as i64;
                        pipe.pexpire_at(key, millis).ignore();
                    }
                    Expiry::Never => {}
                }
                for set in sets {
                    pipe.sadd(set, key).ignore();
                }
                let _: () = pipe.query_async(&mut conn).await?;
                Ok(())
            }
        }
    }

    /// Delete `key` and drop it from `set`, as one atomic step.
    pub(crate) async fn remove(&self, key: &str, set: &str) -> CacheResult<()> {
        match self {
            CacheBackend::Local(store) => {
                store.remove(key, set);
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let _: () = redis::pipe()
                    .atomic()
                    .del(key)
                    .ignore()
                    .srem(set, key)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            }
        }
    }

    /// Delete every member of every set in `sets`, then the sets themselves.
    /// Returns the number of entries removed.
    pub(crate) async fn drain_sets(&self, sets: &[String]) -> CacheResult<u64> {
        if sets.is_empty() {
            return Ok(0);
        }
        match self {
            CacheBackend::Local(store) => Ok(store.drain_sets(sets)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let mut invocation = DRAIN_SETS.prepare_invoke();
                for set in sets {
                    invocation.key(set);
                }
                let removed: u64 = invocation.invoke_async(&mut conn).await?;
                Ok(removed)
            }
        }
    }

    pub(crate) async fn set_members(&self, set: &str) -> CacheResult<Vec<String>> {
        match self {
            CacheBackend::Local(store) => Ok(store.set_members(set)),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let members: Vec<String> = redis::cmd("SMEMBERS")
                    .arg(set)
                    .query_async(&mut conn)
                    .await?;
                Ok(members)
            }
        }
    }
}
