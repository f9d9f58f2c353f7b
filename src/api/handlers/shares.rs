use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use super::files::stream_download;
use crate::api::auth::CurrentUser;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::drive::{NewShare, ShareView, SharedFile};
use crate::storage::models::UserShareRecord;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ResolveShareParams {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareWithUserRequest {
    pub user_id: String,
}

// ============================================================================
// Public links
// ============================================================================

pub async fn create_share(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(file_id): Path<String>,
    AppJson(req): AppJson<NewShare>,
) -> Result<Json<JSend<ShareView>>, ApiError> {
    let share = state.drive.create_share(&user.user_id, &file_id, req)?;
    Ok(JSend::success(share.into()))
}

pub async fn list_shares(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(file_id): Path<String>,
) -> Result<Json<JSend<Vec<ShareView>>>, ApiError> {
    let shares = state.drive.list_shares(&user.user_id, &file_id)?;
    Ok(JSend::success(shares.into_iter().map(ShareView::from).collect()))
}

pub async fn delete_share(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(share_id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.drive.delete_share(&user.user_id, &share_id)?;
    Ok(JSend::success(()))
}

/// Anonymous download through a share token.
pub async fn download_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    AppQuery(params): AppQuery<ResolveShareParams>,
) -> Result<Response, ApiError> {
    let download = state
        .drive
        .resolve_share(&token, params.password.as_deref())
        .await?;
    Ok(stream_download(download))
}

// ============================================================================
// Direct grants
// ============================================================================

pub async fn share_with_user(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(file_id): Path<String>,
    AppJson(req): AppJson<ShareWithUserRequest>,
) -> Result<Json<JSend<UserShareRecord>>, ApiError> {
    let grant = state
        .drive
        .share_with_user(&user.user_id, &file_id, &req.user_id)?;
    Ok(JSend::success(grant))
}

pub async fn revoke_user_share(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((file_id, share_id)): Path<(String, String)>,
) -> Result<Json<JSend<()>>, ApiError> {
    state
        .drive
        .revoke_grant(&user.user_id, &file_id, &share_id)?;
    Ok(JSend::success(()))
}

pub async fn list_user_shares(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(file_id): Path<String>,
) -> Result<Json<JSend<Vec<UserShareRecord>>>, ApiError> {
    Ok(JSend::success(
        state.drive.list_grants(&user.user_id, &file_id)?,
    ))
}

pub async fn shared_with_me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<JSend<Vec<SharedFile>>>, ApiError> {
    Ok(JSend::success(state.drive.shared_with_me(&user.user_id)?))
}

pub async fn user_share_access(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(share_id): Path<String>,
) -> Result<Json<JSend<SharedFile>>, ApiError> {
    Ok(JSend::success(
        state.drive.grant_access(&user.user_id, &share_id)?,
    ))
}

/// Download a file through a direct grant.
pub async fn download_granted(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state
        .drive
        .resolve_for_user(&file_id, &user.user_id)
        .await?;
    Ok(stream_download(download))
}
