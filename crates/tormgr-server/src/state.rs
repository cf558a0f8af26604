use std::sync::Arc;

use tormgr_cache::{QueryCache, TokenCache};
use tormgr_db_postgres::PostgresStorage;

use crate::config::AppConfig;

/// Handles shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub storage: PostgresStorage,
    pub queries: QueryCache,
    pub tokens: TokenCache,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        storage: PostgresStorage,
        queries: QueryCache,
        tokens: TokenCache,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            storage,
            queries,
            tokens,
            config,
        }
    }
}
