//! PostgreSQL system of record for tormgr.
//!
//! Provides persistent storage for:
//!
//! - Users and their password hashes
//! - Folders, owned by a user
//! - Torrents, filed under a folder
//! - Access tokens, exposed to the token cache as a [`CredentialStore`]
//!
//! Reads that the server caches expose their SQL text as constants so the
//! query cache can fingerprint exactly the statement that runs.
//!
//! # Example
//!
//! ```ignore
//! use tormgr_db_postgres::{PostgresConfig, PostgresStorage};
//!
//! let storage = PostgresStorage::connect(&PostgresConfig::new("postgres://localhost/tormgr")).await?;
//! storage.migrate().await?;
//! let folders = storage.folders().list_for_owner(&user.id).await?;
//! ```
//!
//! [`CredentialStore`]: tormgr_cache::CredentialStore

pub mod config;
pub mod folders;
pub mod migrations;
pub mod password;
pub mod pool;
pub mod tokens;
pub mod torrents;
pub mod users;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;
use tormgr_core::CoreError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use config::PostgresConfig;
pub use folders::FolderStorage;
pub use tokens::{PostgresCredentialStore, TokenStorage};
pub use torrents::{NewTorrent, TorrentStorage, TorrentUpdate};
pub use users::UserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a client error (4xx equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Conflict(_) | Self::InvalidInput(_)
        )
    }

    /// Returns `true` if this is a server error (5xx equivalent).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Serialization(_))
    }

    /// Map a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(e: sqlx_core::Error, conflict: impl FnOnce() -> String) -> Self {
        if let sqlx_core::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::conflict(conflict());
        }
        Self::from(e)
    }
}

impl From<CoreError> for StorageError {
    fn from(e: CoreError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Storage
// =============================================================================

/// Holds the connection pool and hands out per-entity storage views.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create the pool described by `config`.
    pub async fn connect(config: &PostgresConfig) -> StorageResult<Self> {
        let pool = pool::create_pool(config).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> StorageResult<()> {
        pool::test_connection(&self.pool).await
    }

    /// Close every connection. Used at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    #[must_use]
    pub fn folders(&self) -> FolderStorage<'_> {
        FolderStorage::new(&self.pool)
    }

    #[must_use]
    pub fn torrents(&self) -> TorrentStorage<'_> {
        TorrentStorage::new(&self.pool)
    }

    #[must_use]
    pub fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }

    /// The token table as the token cache's source of truth.
    #[must_use]
    pub fn credential_store(&self) -> PostgresCredentialStore {
        PostgresCredentialStore::new(Arc::clone(&self.pool))
    }
}

// =============================================================================
// Tests
// =============================================================================
