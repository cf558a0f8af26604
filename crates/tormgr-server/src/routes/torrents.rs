use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tormgr_core::{MagnetLink, RecordId, TorrentStatus};
use tormgr_db_postgres::torrents::{GET, LIST_FOR_FOLDER, LIST_FOR_OWNER, NewTorrent, TorrentUpdate};

use super::{invalidate, owner_torrents_tag, torrent_tag, torrents_tag};
use crate::auth::{ReadAccess, ReadWriteAccess};
use crate::cacheable::conditional_response;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentBody {
    #[serde(rename = "sourceURL", default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub info_hash: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl TorrentBody {
    /// Resolve the body into the row to insert.
    ///
    /// A magnet `sourceURL` supplies the info hash and title unless the body
    /// sets them; any other source needs an explicit `infoHash`.
    pub fn into_new_torrent(self) -> ApiResult<NewTorrent> {
        let source_url = self.source_url.unwrap_or_default().trim().to_string();
        let magnet = if MagnetLink::is_magnet(&source_url) {
            Some(MagnetLink::parse(&source_url)?)
        } else {
            None
        };

        let info_hash = self
            .info_hash
            .map(|h| h.trim().to_ascii_uppercase())
            .filter(|h| !h.is_empty())
            .or_else(|| magnet.as_ref().map(|m| m.info_hash.clone()))
            .ok_or_else(|| ApiError::bad_request("infoHash is required"))?;
        if !info_hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ApiError::bad_request(format!("invalid infoHash {info_hash:?}")));
        }

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| magnet.as_ref().map(|m| m.title.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| info_hash.clone());
        let trackers = magnet.map(|m| m.trackers).unwrap_or_default();

        Ok(NewTorrent {
            title,
            info_hash,
            source_url,
            trackers,
        })
    }
}

/// Body of `PUT /folders/{id}/torrents/{torrent_id}`.
#[derive(Debug, Default, Deserialize)]
pub struct TorrentChanges {
    #[serde(default)]
    pub status: Option<String>,
    /// Folder to move the torrent into.
    #[serde(default)]
    pub folder: Option<String>,
}

impl TorrentChanges {
    pub fn into_update(self) -> ApiResult<TorrentUpdate> {
        let status = self
            .status
            .map(|s| s.trim().parse::<TorrentStatus>())
            .transpose()?;
        let folder = self.folder.map(|f| RecordId::parse(f.trim())).transpose()?;
        let update = TorrentUpdate { status, folder };
        if update.is_empty() {
            return Err(ApiError::bad_request("status or folder is required"));
        }
        Ok(update)
    }
}

pub async fn list_all(
    State(state): State<AppState>,
    ReadAccess(principal): ReadAccess,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = &principal.user.id;
    let tag = owner_torrents_tag(owner);
    let cached = state
        .queries
        .fetch_or_compute(&tag, LIST_FOR_OWNER, &[owner], || async {
            Ok::<_, ApiError>(state.storage.torrents().list_for_owner(owner).await?)
        })
        .await?;
    Ok(conditional_response(&headers, cached))
}

pub async fn list(
    State(state): State<AppState>,
    ReadAccess(principal): ReadAccess,
    Path(folder): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = &principal.user.id;
    let folder = RecordId::parse(&folder)?;
    let tag = torrents_tag(owner, &folder)?;
    let cached = state
        .queries
        .fetch_or_compute(&tag, LIST_FOR_FOLDER, &[owner, &folder], || async {
            Ok::<_, ApiError>(
                state
                    .storage
                    .torrents()
                    .list_for_folder(owner, &folder)
                    .await?,
            )
        })
        .await?;
    Ok(conditional_response(&headers, cached))
}

pub async fn get(
    State(state): State<AppState>,
    ReadAccess(principal): ReadAccess,
    Path((folder, torrent_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = &principal.user.id;
    let folder = RecordId::parse(&folder)?;
    let torrent_id = RecordId::parse(&torrent_id)?;
    let tag = torrent_tag(owner, &folder, &torrent_id)?;
    let cached = state
        .queries
        .fetch_or_compute(&tag, GET, &[owner, &folder, &torrent_id], || async {
            state
                .storage
                .torrents()
                .get(owner, &folder, &torrent_id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("Torrent '{torrent_id}'")))
        })
        .await?;
    Ok(conditional_response(&headers, cached))
}

pub async fn create(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path(folder): Path<String>,
    Json(body): Json<TorrentBody>,
) -> ApiResult<impl IntoResponse> {
    let owner = &principal.user.id;
    let folder = RecordId::parse(&folder)?;
    let torrent = state
        .storage
        .torrents()
        .create(owner, &folder, body.into_new_torrent()?)
        .await?;
    invalidate(&state, &torrent_tag(owner, &folder, &torrent.id)?).await;
    Ok((StatusCode::CREATED, Json(torrent)))
}

/// Change the status of a torrent or move it to another folder.
///
/// Both the source and the destination folder tags are invalidated: the
/// torrent leaves one list and joins the other.
pub async fn update(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path((folder, torrent_id)): Path<(String, String)>,
    Json(body): Json<TorrentChanges>,
) -> ApiResult<Json<tormgr_core::Torrent>> {
    let owner = &principal.user.id;
    let folder = RecordId::parse(&folder)?;
    let torrent_id = RecordId::parse(&torrent_id)?;
    let update = body.into_update()?;
    let torrent = state
        .storage
        .torrents()
        .update(owner, &folder, &torrent_id, &update)
        .await?;

    invalidate(&state, &torrent_tag(owner, &folder, &torrent_id)?).await;
    if torrent.folder != folder {
        invalidate(&state, &torrent_tag(owner, &torrent.folder, &torrent_id)?).await;
    }
    Ok(Json(torrent))
}

pub async fn remove(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path((folder, torrent_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let owner = &principal.user.id;
    let folder = RecordId::parse(&folder)?;
    let torrent_id = RecordId::parse(&torrent_id)?;
    state
        .storage
        .torrents()
        .delete(owner, &folder, &torrent_id)
        .await?;
    invalidate(&state, &torrent_tag(owner, &folder, &torrent_id)?).await;
    Ok(StatusCode::NO_CONTENT)
}
