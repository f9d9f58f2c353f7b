use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::files::non_empty;
use crate::api::auth::CurrentUser;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::drive::{Breadcrumb, DeleteSummary, FolderListing, FolderPatch, FolderSummary};
use crate::storage::models::FolderRecord;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFoldersParams {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    /// Return every folder of the account instead of one level.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FoldersResponse {
    All(Vec<FolderSummary>),
    Listing(FolderListing),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceFolderRequest {
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteFolderParams {
    #[serde(default)]
    pub force: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_folders(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<ListFoldersParams>,
) -> Result<Json<JSend<FoldersResponse>>, ApiError> {
    let response = if params.all {
        FoldersResponse::All(state.drive.list_all_folders(&user.user_id)?)
    } else {
        FoldersResponse::Listing(state.drive.list_folder(
            &user.user_id,
            non_empty(params.parent_id.as_deref()),
            params.search.as_deref(),
        )?)
    };
    Ok(JSend::success(response))
}

pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateFolderRequest>,
) -> Result<Json<JSend<FolderRecord>>, ApiError> {
    let folder = state
        .drive
        .create_folder(
            &user.user_id,
            &req.name,
            non_empty(req.parent_id.as_deref()),
            req.color.as_deref(),
        )
        .await?;
    Ok(JSend::success(folder))
}

pub async fn update_folder(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(patch): AppJson<FolderPatch>,
) -> Result<Json<JSend<FolderRecord>>, ApiError> {
    if patch.name.is_none() && patch.color.is_none() {
        return Err(ApiError::bad_request(
            "at least one field (name, color) must be provided",
        ));
    }
    let folder = state.drive.update_folder(&user.user_id, &id, patch).await?;
    Ok(JSend::success(folder))
}

pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppQuery(params): AppQuery<DeleteFolderParams>,
) -> Result<Json<JSend<DeleteSummary>>, ApiError> {
    let summary = state
        .drive
        .delete_folder(&user.user_id, &id, params.force)
        .await?;
    Ok(JSend::success(summary))
}

pub async fn move_folder(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PlaceFolderRequest>,
) -> Result<Json<JSend<FolderRecord>>, ApiError> {
    let folder = state
        .drive
        .move_folder(&user.user_id, &id, non_empty(req.parent_id.as_deref()))
        .await?;
    Ok(JSend::success(folder))
}

pub async fn copy_folder(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PlaceFolderRequest>,
) -> Result<Json<JSend<FolderRecord>>, ApiError> {
    let folder = state
        .drive
        .copy_folder(&user.user_id, &id, non_empty(req.parent_id.as_deref()))
        .await?;
    Ok(JSend::success(folder))
}

pub async fn breadcrumb(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<Breadcrumb>>, ApiError> {
    Ok(JSend::success(state.drive.breadcrumb(&user.user_id, &id)?))
}
