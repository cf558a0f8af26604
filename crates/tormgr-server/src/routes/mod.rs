//! `/api/1.0` handlers.
//!
//! Reads go through the query cache and answer conditionally; every write to
//! the database is followed by an invalidation of the tags it touches.

mod folders;
mod torrents;
mod users;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tormgr_cache::Tag;
use tormgr_core::RecordId;

use crate::state::AppState;

pub const API_BASE: &str = "/api/1.0";

pub const FOLDERS_TABLE: &str = "folders";
pub const TORRENTS_TABLE: &str = "torrents";

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(users::create))
        .route("/users/me", get(users::me))
        .route(
            "/users/tokens",
            post(users::issue_token).delete(users::revoke_all_tokens),
        )
        .route("/users/tokens/{secret}", delete(users::revoke_token))
        .route("/folders", get(folders::list).post(folders::create))
        .route(
            "/folders/{id}",
            get(folders::get).put(folders::rename).delete(folders::remove),
        )
        .route(
            "/folders/{id}/torrents",
            get(torrents::list).post(torrents::create),
        )
        .route(
            "/folders/{id}/torrents/{torrent_id}",
            get(torrents::get)
                .put(torrents::update)
                .delete(torrents::remove),
        )
        .route("/torrents", get(torrents::list_all))
}

/// Invalidate after a write. Failures are already logged by the cache and
/// the entries' TTL bounds the staleness, so the request still succeeds.
async fn invalidate(state: &AppState, tag: &Tag) {
    let _ = state.queries.invalidate_after_write(tag).await;
}

fn folder_tag(owner: &RecordId, id: Option<&RecordId>) -> Result<Tag, tormgr_cache::CacheError> {
    let tag = Tag::new(FOLDERS_TABLE, owner);
    match id {
        Some(id) => tag.with_param("id", id),
        None => Ok(tag),
    }
}

fn owner_torrents_tag(owner: &RecordId) -> Tag {
    Tag::new(TORRENTS_TABLE, owner)
}

fn torrents_tag(owner: &RecordId, folder: &RecordId) -> Result<Tag, tormgr_cache::CacheError> {
    owner_torrents_tag(owner).with_param("folder", folder)
}

/// Tag of a single torrent. Invalidating it also drains the folder list and
/// the owner-wide list, whose tags are subsets of this one.
fn torrent_tag(
    owner: &RecordId,
    folder: &RecordId,
    id: &RecordId,
) -> Result<Tag, tormgr_cache::CacheError> {
    torrents_tag(owner, folder)?.with_param("id", id)
}
