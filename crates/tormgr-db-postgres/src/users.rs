//! User storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tormgr_core::{RecordId, User, normalize_email};

use crate::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use crate::{PgPool, StorageError, StorageResult};

fn user_from_tuple(row: (String, String)) -> StorageResult<User> {
    Ok(User {
        id: RecordId::parse(&row.0)?,
        email: row.1,
    })
}

pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a user with a normalized email and a hashed password.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a malformed email or a short password, `Conflict`
    /// when the email is already registered.
    pub async fn create(&self, email: &str, password: &str) -> StorageResult<User> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(StorageError::invalid_input(format!("invalid email {email:?}")));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StorageError::invalid_input(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let user = User {
            id: RecordId::generate(),
            email,
        };
        let password_hash = hash_password(password)?;

        query("INSERT INTO users (id, email, password_hash) VALUES ($1, $2, $3)")
            .bind(user.id.as_str())
            .bind(&user.email)
            .bind(&password_hash)
            .execute(self.pool)
            .await
            .map_err(|e| StorageError::from_insert(e, || "User already exists".to_string()))?;

        tracing::info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: &RecordId) -> StorageResult<Option<User>> {
        let row: Option<(String, String)> =
            query_as("SELECT id, email FROM users WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(self.pool)
                .await?;

        row.map(user_from_tuple).transpose()
    }

    /// The user owning `email` if `password` matches, else `None`.
    ///
    /// Unknown emails and wrong passwords are indistinguishable to the caller.
    pub async fn authenticate_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> StorageResult<Option<User>> {
        let row: Option<(String, String, String)> =
            query_as("SELECT id, email, password_hash FROM users WHERE email = $1")
                .bind(normalize_email(email))
                .fetch_optional(self.pool)
                .await?;

        let Some((id, email, password_hash)) = row else {
            return Ok(None);
        };
        if !verify_password(password, &password_hash) {
            return Ok(None);
        }
        user_from_tuple((id, email)).map(Some)
    }
}
