use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use tormgr_db_postgres::PostgresConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub postgres: PostgresStorageConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Query cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Access token lifetime and expiry sweep
    #[serde(default)]
    pub tokens: TokensConfig,
    /// Connection retries at startup
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let pg = &self.postgres;
        if pg.url.is_none() && pg.host.is_empty() {
            return Err("postgres requires either 'url' or 'host' to be set".into());
        }
        if pg.url.is_none() && pg.database.is_empty() {
            return Err("postgres.database must not be empty".into());
        }
        if pg.pool_size == 0 {
            return Err("postgres.pool_size must be > 0".into());
        }
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.cache.query_ttl_secs == 0 {
            return Err("cache.query_ttl_secs must be > 0".into());
        }
        if self.tokens.sweep_interval_secs == 0 {
            return Err("tokens.sweep_interval_secs must be > 0".into());
        }
        if self.tokens.lifetime_secs == Some(0) {
            return Err("tokens.lifetime_secs must be > 0 when set".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// PostgreSQL connection settings.
///
/// Either a full `url`, or the individual parts from which one is built. The
/// url wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresStorageConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_postgres_host")]
    pub host: String,
    #[serde(default = "default_postgres_port")]
    pub port: u16,
    #[serde(default = "default_postgres_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_postgres_database")]
    pub database: String,
    #[serde(default = "default_postgres_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_postgres_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

fn default_postgres_host() -> String {
    "localhost".into()
}
fn default_postgres_port() -> u16 {
    5432
}
fn default_postgres_user() -> String {
    "postgres".into()
}
fn default_postgres_database() -> String {
    "tormgr".into()
}
fn default_postgres_pool_size() -> u32 {
    10
}
fn default_postgres_connect_timeout() -> u64 {
    5000
}

impl PostgresStorageConfig {
    pub fn connection_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }

        let password_part = self
            .password
            .as_ref()
            .map(|p| format!(":{}", p))
            .unwrap_or_default();

        format!(
            "postgres://{}{}@{}:{}/{}",
            self.user, password_part, self.host, self.port, self.database
        )
    }

    /// Settings for the storage crate's pool.
    pub fn to_storage_config(&self) -> PostgresConfig {
        PostgresConfig {
            url: self.connection_url(),
            pool_size: self.pool_size,
            connect_timeout_ms: self.connect_timeout_ms,
            idle_timeout_ms: self.idle_timeout_ms,
            run_migrations: true,
        }
    }
}

impl Default for PostgresStorageConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: default_postgres_user(),
            password: None,
            database: default_postgres_database(),
            pool_size: default_postgres_pool_size(),
            connect_timeout_ms: default_postgres_connect_timeout(),
            idle_timeout_ms: Some(300_000),
        }
    }
}

/// Redis configuration for the shared cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Without Redis the caches live in process memory.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection and checkout timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_redis_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached query results in seconds
    #[serde(default = "default_query_ttl_secs")]
    pub query_ttl_secs: u64,
}

fn default_query_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_ttl_secs: default_query_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Interval between deletions of expired tokens, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Lifetime of issued tokens in seconds; unset means they never expire
    #[serde(default)]
    pub lifetime_secs: Option<u64>,
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            lifetime_secs: None,
        }
    }
}

impl TokensConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Retries after the first failed connection attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    4
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "tormgr.toml";

    /// Load the optional TOML file at `path` (or `tormgr.toml`) overlaid by
    /// `TORMGR__SECTION__KEY` environment variables, then validate.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TORMGR__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("TORMGR")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
