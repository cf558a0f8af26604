//! Folder storage.
//!
//! The `LIST_FOR_OWNER` and `GET` statements are public: the server passes
//! them to the query cache as the fingerprinted query text.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tormgr_core::{Folder, RecordId};

use crate::{PgPool, StorageError, StorageResult};

pub const LIST_FOR_OWNER: &str = "SELECT id, name FROM folders WHERE owner_id = $1 ORDER BY name, id";
pub const GET: &str = "SELECT id, name FROM folders WHERE owner_id = $1 AND id = $2";

fn folder_from_tuple(owner_id: &RecordId, row: (String, String)) -> StorageResult<Folder> {
    Ok(Folder {
        id: RecordId::parse(&row.0)?,
        name: row.1,
        owner_id: Some(owner_id.clone()),
    })
}

pub struct FolderStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> FolderStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_owner(&self, owner_id: &RecordId) -> StorageResult<Vec<Folder>> {
        let rows: Vec<(String, String)> = query_as(LIST_FOR_OWNER)
            .bind(owner_id.as_str())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter()
            .map(|row| folder_from_tuple(owner_id, row))
            .collect()
    }

    pub async fn get(&self, owner_id: &RecordId, id: &RecordId) -> StorageResult<Option<Folder>> {
        let row: Option<(String, String)> = query_as(GET)
            .bind(owner_id.as_str())
            .bind(id.as_str())
            .fetch_optional(self.pool)
            .await?;

        row.map(|row| folder_from_tuple(owner_id, row)).transpose()
    }

    /// # Errors
    ///
    /// `Conflict` when the owner already has a folder with this id.
    pub async fn create(&self, owner_id: &RecordId, folder: &Folder) -> StorageResult<Folder> {
        query("INSERT INTO folders (id, owner_id, name) VALUES ($1, $2, $3)")
            .bind(folder.id.as_str())
            .bind(owner_id.as_str())
            .bind(&folder.name)
            .execute(self.pool)
            .await
            .map_err(|e| {
                StorageError::from_insert(e, || format!("Folder '{}' already exists", folder.id))
            })?;

        Ok(Folder {
            id: folder.id.clone(),
            name: folder.name.clone(),
            owner_id: Some(owner_id.clone()),
        })
    }

    /// # Errors
    ///
    /// `NotFound` when the owner has no such folder.
    pub async fn rename(
        &self,
        owner_id: &RecordId,
        id: &RecordId,
        name: &str,
    ) -> StorageResult<Folder> {
        let result = query("UPDATE folders SET name = $3 WHERE owner_id = $1 AND id = $2")
            .bind(owner_id.as_str())
            .bind(id.as_str())
            .bind(name)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("Folder '{id}'")));
        }
        Ok(Folder {
            id: id.clone(),
            name: name.to_string(),
            owner_id: Some(owner_id.clone()),
        })
    }

    /// Delete a folder and, through the foreign key, its torrents.
    ///
    /// # Errors
    ///
    /// `NotFound` when the owner has no such folder.
    pub async fn delete(&self, owner_id: &RecordId, id: &RecordId) -> StorageResult<()> {
        let result = query("DELETE FROM folders WHERE owner_id = $1 AND id = $2")
            .bind(owner_id.as_str())
            .bind(id.as_str())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("Folder '{id}'")));
        }
        Ok(())
    }
}
