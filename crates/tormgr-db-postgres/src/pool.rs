//! Connection pool management.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::Postgres;
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::{PgPool, StorageResult};

pub type PgPoolOptions = PoolOptions<Postgres>;

/// Create a connection pool from `config`.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> StorageResult<PgPool> {
    info!(
        pool_size = config.pool_size,
        connect_timeout_ms = config.connect_timeout_ms,
        "Creating PostgreSQL connection pool"
    );

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms));

    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;
    debug!("PostgreSQL connection pool created");
    Ok(pool)
}

pub async fn test_connection(pool: &PgPool) -> StorageResult<()> {
    sqlx_core::query::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Masks the password in a database URL for logging.
pub fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if colon_pos > scheme_end {
            return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}
