//! Torrent storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tormgr_core::{RecordId, Torrent, TorrentStatus};

use crate::{PgPool, StorageError, StorageResult};

const COLUMNS: &str = "id, folder, title, info_hash, source_url, status, trackers";

pub const LIST_FOR_OWNER: &str = "SELECT id, folder, title, info_hash, source_url, status, trackers \
     FROM torrents WHERE owner_id = $1 ORDER BY created_at, id";
pub const LIST_FOR_FOLDER: &str = "SELECT id, folder, title, info_hash, source_url, status, trackers \
     FROM torrents WHERE owner_id = $1 AND folder = $2 ORDER BY created_at, id";
pub const GET: &str = "SELECT id, folder, title, info_hash, source_url, status, trackers \
     FROM torrents WHERE owner_id = $1 AND folder = $2 AND id = $3";

type TorrentTuple = (String, String, String, String, String, String, Vec<String>);

fn torrent_from_tuple(row: TorrentTuple) -> StorageResult<Torrent> {
    Ok(Torrent {
        id: RecordId::parse(&row.0)?,
        folder: RecordId::parse(&row.1)?,
        title: row.2,
        info_hash: row.3,
        source_url: row.4,
        status: row.5.parse::<TorrentStatus>()?,
        trackers: row.6,
    })
}

/// A torrent to file under a folder.
#[derive(Debug, Clone, Default)]
pub struct NewTorrent {
    pub title: String,
    pub info_hash: String,
    pub source_url: String,
    pub trackers: Vec<String>,
}

/// Changes to an existing torrent. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentUpdate {
    pub status: Option<TorrentStatus>,
    /// Destination folder of a move.
    pub folder: Option<RecordId>,
}

impl TorrentUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.folder.is_none()
    }
}

pub struct TorrentStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TorrentStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every torrent of the owner, across folders.
    pub async fn list_for_owner(&self, owner_id: &RecordId) -> StorageResult<Vec<Torrent>> {
        let rows: Vec<TorrentTuple> = query_as(LIST_FOR_OWNER)
            .bind(owner_id.as_str())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(torrent_from_tuple).collect()
    }

    pub async fn list_for_folder(
        &self,
        owner_id: &RecordId,
        folder: &RecordId,
    ) -> StorageResult<Vec<Torrent>> {
        let rows: Vec<TorrentTuple> = query_as(LIST_FOR_FOLDER)
            .bind(owner_id.as_str())
            .bind(folder.as_str())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(torrent_from_tuple).collect()
    }

    pub async fn get(
        &self,
        owner_id: &RecordId,
        folder: &RecordId,
        id: &RecordId,
    ) -> StorageResult<Option<Torrent>> {
        let row: Option<TorrentTuple> = query_as(GET)
            .bind(owner_id.as_str())
            .bind(folder.as_str())
            .bind(id.as_str())
            .fetch_optional(self.pool)
            .await?;

        row.map(torrent_from_tuple).transpose()
    }

    /// # Errors
    ///
    /// `NotFound` when the owner has no such folder.
    pub async fn create(
        &self,
        owner_id: &RecordId,
        folder: &RecordId,
        torrent: NewTorrent,
    ) -> StorageResult<Torrent> {
        let id = RecordId::generate();
        let row: Option<TorrentTuple> = query_as(&format!(
            r#"
            INSERT INTO torrents (id, owner_id, folder, title, info_hash, source_url, trackers)
            SELECT $1, f.owner_id, f.id, $4, $5, $6, $7
            FROM folders f
            WHERE f.owner_id = $2 AND f.id = $3
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.as_str())
        .bind(owner_id.as_str())
        .bind(folder.as_str())
        .bind(&torrent.title)
        .bind(&torrent.info_hash)
        .bind(&torrent.source_url)
        .bind(&torrent.trackers)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => torrent_from_tuple(row),
            None => Err(StorageError::not_found(format!("Folder '{folder}'"))),
        }
    }

    /// Change the status of the torrent `id` in `folder` and/or move it to
    /// another folder of the same owner.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty update, `NotFound` when the folder holds no
    /// such torrent or the destination folder does not exist.
    pub async fn update(
        &self,
        owner_id: &RecordId,
        folder: &RecordId,
        id: &RecordId,
        update: &TorrentUpdate,
    ) -> StorageResult<Torrent> {
        if update.is_empty() {
            return Err(StorageError::invalid_input("nothing to update"));
        }

        let row: Option<TorrentTuple> = query_as(&format!(
            r#"
            UPDATE torrents
            SET status = COALESCE($4, status), folder = COALESCE($5, folder)
            WHERE owner_id = $1 AND folder = $2 AND id = $3
            RETURNING {COLUMNS}
            "#
        ))
        .bind(owner_id.as_str())
        .bind(folder.as_str())
        .bind(id.as_str())
        .bind(update.status.map(TorrentStatus::as_str))
        .bind(update.folder.as_ref().map(RecordId::as_str))
        .fetch_optional(self.pool)
        .await
        .map_err(|e| match e {
            sqlx_core::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                let destination = update.folder.as_ref().map(RecordId::as_str).unwrap_or("");
                StorageError::not_found(format!("Folder '{destination}'"))
            }
            other => StorageError::from(other),
        })?;

        match row {
            Some(row) => torrent_from_tuple(row),
            None => Err(StorageError::not_found(format!("Torrent '{id}'"))),
        }
    }

    /// # Errors
    ///
    /// `NotFound` when the folder holds no such torrent.
    pub async fn delete(
        &self,
        owner_id: &RecordId,
        folder: &RecordId,
        id: &RecordId,
    ) -> StorageResult<()> {
        let result = query("DELETE FROM torrents WHERE owner_id = $1 AND folder = $2 AND id = $3")
            .bind(owner_id.as_str())
            .bind(folder.as_str())
            .bind(id.as_str())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("Torrent '{id}'")));
        }
        Ok(())
    }
}
