//! Startup wiring: connections with retry, schema, caches and background
//! tasks.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tormgr_cache::{CacheBackend, CredentialStore, QueryCache, TokenCache, spawn_expiry_sweep};
use tormgr_db_postgres::PostgresStorage;

use crate::config::{AppConfig, RedisConfig, StartupConfig};
use crate::state::AppState;

/// Interval between purges of expired entries in the in-process cache.
pub const LOCAL_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before retry number `attempt` (0-based): exponential, capped, with
/// up to 50% random jitter added.
pub fn backoff_delay(cfg: &StartupConfig, attempt: u32) -> Duration {
    let base = cfg
        .initial_backoff_ms
        .saturating_mul(1u64 << attempt.min(20))
        .min(cfg.max_backoff_ms);
    let jitter = if base > 1 {
        rand::thread_rng().gen_range(0..=base / 2)
    } else {
        0
    };
    Duration::from_millis(base + jitter)
}

/// Run `op` until it succeeds or `cfg.max_retries` retries have failed.
pub async fn retry_with_backoff<T, E, F, Fut>(
    what: &str,
    cfg: &StartupConfig,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < cfg.max_retries => {
                let delay = backoff_delay(cfg, attempt);
                tracing::warn!(
                    target_service = what,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Connect to Postgres and bring the schema up to date.
pub async fn connect_storage(cfg: &AppConfig) -> anyhow::Result<PostgresStorage> {
    let pg = cfg.postgres.to_storage_config();
    let storage = retry_with_backoff("postgres", &cfg.startup, || PostgresStorage::connect(&pg)).await?;
    if pg.run_migrations {
        storage.migrate().await?;
    }
    Ok(storage)
}

async fn connect_redis(config: &RedisConfig) -> anyhow::Result<deadpool_redis::Pool> {
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    let timeout = Some(Duration::from_millis(config.timeout_ms));
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    let pool = redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
    // Test connection
    drop(pool.get().await?);
    Ok(pool)
}

/// Build the cache backend: Redis when enabled and reachable, the in-process
/// store otherwise.
pub async fn create_cache_backend(cfg: &AppConfig) -> CacheBackend {
    if !cfg.redis.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %cfg.redis.url, "Connecting to Redis");
    match retry_with_backoff("redis", &cfg.startup, || connect_redis(&cfg.redis)).await {
        Ok(pool) => {
            tracing::info!("Connected to Redis");
            CacheBackend::new_redis(pool)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to local cache.");
            CacheBackend::new_local()
        }
    }
}

/// Periodically drop expired entries of the in-process cache.
pub fn spawn_local_cleanup(backend: CacheBackend, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = backend.cleanup_expired();
            if removed > 0 {
                tracing::debug!(removed, "expired local cache entries purged");
            }
        }
    })
}

/// Everything the server needs, plus the background tasks to abort on
/// shutdown.
pub struct Bootstrapped {
    pub state: AppState,
    pub background: Vec<JoinHandle<()>>,
}

/// Assemble the application state from configuration.
pub async fn bootstrap(cfg: AppConfig) -> anyhow::Result<Bootstrapped> {
    let config = Arc::new(cfg);
    let storage = connect_storage(&config).await?;
    let backend = create_cache_backend(&config).await;

    let credentials: Arc<dyn CredentialStore> = Arc::new(storage.credential_store());
    let queries = QueryCache::new(backend.clone(), config.cache.query_ttl());
    let tokens = TokenCache::new(backend.clone(), credentials.clone());

    let mut background = vec![spawn_expiry_sweep(
        credentials,
        config.tokens.sweep_interval(),
    )];
    if backend.local_entries().is_some() {
        background.push(spawn_local_cleanup(backend.clone(), LOCAL_CLEANUP_INTERVAL));
    }

    tracing::info!(cache = backend.mode(), "application state ready");
    Ok(Bootstrapped {
        state: AppState::new(storage, queries, tokens, config),
        background,
    })
}
