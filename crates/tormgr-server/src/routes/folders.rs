use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tormgr_core::{Folder, RecordId};
use tormgr_db_postgres::folders::{GET, LIST_FOR_OWNER};

use super::{folder_tag, invalidate, torrents_tag};
use crate::auth::{ReadAccess, ReadWriteAccess};
use crate::cacheable::conditional_response;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FolderBody {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
}

fn title_of(body: &FolderBody) -> ApiResult<String> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    Ok(title.to_string())
}

pub async fn list(
    State(state): State<AppState>,
    ReadAccess(principal): ReadAccess,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = &principal.user.id;
    let tag = folder_tag(owner, None)?;
    let cached = state
        .queries
        .fetch_or_compute(&tag, LIST_FOR_OWNER, &[owner], || async {
            Ok::<_, ApiError>(state.storage.folders().list_for_owner(owner).await?)
        })
        .await?;
    Ok(conditional_response(&headers, cached))
}

pub async fn get(
    State(state): State<AppState>,
    ReadAccess(principal): ReadAccess,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let owner = &principal.user.id;
    let id = RecordId::parse(&id)?;
    let tag = folder_tag(owner, Some(&id))?;
    let cached = state
        .queries
        .fetch_or_compute(&tag, GET, &[owner, &id], || async {
            state
                .storage
                .folders()
                .get(owner, &id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("Folder '{id}'")))
        })
        .await?;
    Ok(conditional_response(&headers, cached))
}

pub async fn create(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Json(body): Json<FolderBody>,
) -> ApiResult<impl IntoResponse> {
    let owner = &principal.user.id;
    let id = match body.id.as_deref() {
        Some(id) => RecordId::parse(id)?,
        None => RecordId::generate(),
    };
    let folder = Folder {
        id,
        name: title_of(&body)?,
        owner_id: None,
    };

    let created = state.storage.folders().create(owner, &folder).await?;
    invalidate(&state, &folder_tag(owner, Some(&created.id))?).await;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn rename(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path(id): Path<String>,
    Json(body): Json<FolderBody>,
) -> ApiResult<Json<Folder>> {
    let owner = &principal.user.id;
    let id = RecordId::parse(&id)?;
    let renamed = state
        .storage
        .folders()
        .rename(owner, &id, &title_of(&body)?)
        .await?;
    invalidate(&state, &folder_tag(owner, Some(&id))?).await;
    Ok(Json(renamed))
}

pub async fn remove(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let owner = &principal.user.id;
    let id = RecordId::parse(&id)?;
    state.storage.folders().delete(owner, &id).await?;
    invalidate(&state, &folder_tag(owner, Some(&id))?).await;
    invalidate(&state, &torrents_tag(owner, &id)?).await;
    Ok(StatusCode::NO_CONTENT)
}
