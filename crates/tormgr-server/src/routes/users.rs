use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tormgr_core::{Access, User};

use crate::auth::{ReadAccess, ReadWriteAccess};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    #[serde(default)]
    pub access: String,
}

impl TokenParams {
    /// Access level to issue. Every write route requires ReadWrite, so a
    /// Write-only token could not be used anywhere and is refused.
    pub fn access(&self) -> ApiResult<Access> {
        match self.access.trim().parse()? {
            Access::Write => Err(ApiError::bad_request(
                "Write tokens are not issued; request Read or ReadWrite",
            )),
            access => Ok(access),
        }
    }
}

/// A user together with a freshly issued token.
#[derive(Debug, Serialize)]
pub struct UserWithToken {
    pub user: User,
    pub token: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state.storage.users().create(&body.email, &body.password).await?;
    let token = state
        .tokens
        .issue(&user, Access::ReadWrite, state.config.tokens.lifetime())
        .await?;
    tracing::info!(user = %user, "user created");
    Ok((StatusCode::CREATED, Json(UserWithToken { user, token })))
}

pub async fn me(ReadAccess(principal): ReadAccess) -> Json<User> {
    Json(principal.user)
}

pub async fn issue_token(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Query(params): Query<TokenParams>,
) -> ApiResult<impl IntoResponse> {
    let access = params.access()?;
    let token = state
        .tokens
        .issue(&principal.user, access, state.config.tokens.lifetime())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserWithToken {
            user: principal.user,
            token,
        }),
    ))
}

pub async fn revoke_token(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
    Path(secret): Path<String>,
) -> ApiResult<StatusCode> {
    if state.tokens.revoke(&principal.user.id, &secret).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("Token not found"))
    }
}

pub async fn revoke_all_tokens(
    State(state): State<AppState>,
    ReadWriteAccess(principal): ReadWriteAccess,
) -> ApiResult<StatusCode> {
    let revoked = state.tokens.revoke_all(&principal.user.id).await?;
    tracing::info!(user = %principal.user, revoked, "tokens revoked");
    Ok(StatusCode::NO_CONTENT)
}
