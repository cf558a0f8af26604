//! Access token storage.
//!
//! Tokens are stored in `access_tokens`. [`PostgresCredentialStore`] exposes
//! the table to the token cache, which keeps the rows and the cached copies
//! in step.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tormgr_cache::{AccessToken, CacheError, CacheResult, CredentialStore};
use tormgr_core::{Access, RecordId, User};

use crate::{PgPool, StorageError, StorageResult};

type TokenUserTuple = (String, String, i32, Option<OffsetDateTime>, String);

fn token_from_tuple(row: TokenUserTuple) -> StorageResult<(User, AccessToken)> {
    let (secret, user_id, access, expires_at, email) = row;
    let user_id = RecordId::parse(&user_id)?;
    let access = Access::from_bits(access)
        .ok_or_else(|| StorageError::invalid_input(format!("invalid access bits {access}")))?;

    Ok((
        User {
            id: user_id.clone(),
            email,
        },
        AccessToken {
            secret,
            user_id,
            access,
            expires_at,
        },
    ))
}

pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, token: &AccessToken) -> StorageResult<()> {
        query(
            "INSERT INTO access_tokens (secret, user_id, access, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.secret)
        .bind(token.user_id.as_str())
        .bind(token.access.bits())
        .bind(token.expires_at)
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, || "Token already exists".to_string()))?;

        Ok(())
    }

    /// The token and its user, unless the token is unknown or expired.
    pub async fn find_valid(&self, secret: &str) -> StorageResult<Option<(User, AccessToken)>> {
        let row: Option<TokenUserTuple> = query_as(
            r#"
            SELECT t.secret, t.user_id, t.access, t.expires_at, u.email
            FROM access_tokens t
            JOIN users u ON u.id = t.user_id
            WHERE t.secret = $1
              AND (t.expires_at IS NULL OR t.expires_at > NOW())
            "#,
        )
        .bind(secret)
        .fetch_optional(self.pool)
        .await?;

        row.map(token_from_tuple).transpose()
    }

    pub async fn delete(&self, user_id: &RecordId, secret: &str) -> StorageResult<u64> {
        let result = query("DELETE FROM access_tokens WHERE user_id = $1 AND secret = $2")
            .bind(user_id.as_str())
            .bind(secret)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self, user_id: &RecordId) -> StorageResult<u64> {
        let result = query("DELETE FROM access_tokens WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_expired(&self) -> StorageResult<u64> {
        let result = query("DELETE FROM access_tokens WHERE expires_at < NOW()")
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count_for_user(&self, user_id: &RecordId) -> StorageResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM access_tokens WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }
}

/// [`CredentialStore`] backed by the `access_tokens` table.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    fn tokens(&self) -> TokenStorage<'_> {
        TokenStorage::new(&self.pool)
    }
}

impl From<StorageError> for CacheError {
    fn from(e: StorageError) -> Self {
        CacheError::store(e.to_string())
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    async fn find_valid(&self, secret: &str) -> CacheResult<Option<(User, AccessToken)>> {
        Ok(self.tokens().find_valid(secret).await?)
    }

    async fn insert(&self, token: &AccessToken) -> CacheResult<()> {
        Ok(self.tokens().insert(token).await?)
    }

    async fn delete(&self, user_id: &RecordId, secret: &str) -> CacheResult<u64> {
        Ok(self.tokens().delete(user_id, secret).await?)
    }

    async fn delete_all(&self, user_id: &RecordId) -> CacheResult<u64> {
        Ok(self.tokens().delete_all(user_id).await?)
    }

    async fn delete_expired(&self) -> CacheResult<u64> {
        Ok(self.tokens().delete_expired().await?)
    }
}
