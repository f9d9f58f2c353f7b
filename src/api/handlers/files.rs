use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use crate::api::auth::CurrentUser;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::content_store::ByteStream;
use crate::drive::{Download, DriveError, Upload, UploadOutcome};
use crate::storage::models::{FileRecord, FileVersion};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesParams {
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadParams {
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFileRequest {
    pub original_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceFileRequest {
    /// Destination folder; absent or null is the root.
    #[serde(default)]
    pub folder_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSend<Vec<FileRecord>>>, ApiError> {
    let files = state.drive.list_files(
        &user.user_id,
        non_empty(params.folder_id.as_deref()),
        params.search.as_deref(),
    )?;
    Ok(JSend::success(files))
}

/// Multipart upload with a `file` field. `folderId` may be given as a query
/// parameter or as a form field placed before `file`.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadOutcome>>, ApiError> {
    let mut folder_id = params.folder_id;

    let too_large = || {
        ApiError::payload_too_large(format!(
            "File exceeds maximum upload size of {} bytes",
            state.config.max_upload_size
        ))
    };

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            too_large()
        } else {
            ApiError::bad_request(format!("Invalid multipart data: {e}"))
        }
    })? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "folderId" => {
                folder_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid folderId: {e}")))?,
                );
            }
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("file field must carry a filename"))?;
                let mime_type = field.content_type().map(str::to_string);

                let exceeded = Arc::new(AtomicBool::new(false));
                let body_limited = Arc::clone(&exceeded);
                let body = limit_size(
                    field.map(move |chunk| {
                        chunk.map_err(|e| {
                            // The request body limit tripped before the file limit did
                            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                                body_limited.store(true, Ordering::Relaxed);
                            }
                            std::io::Error::other(e)
                        })
                    }),
                    state.config.max_upload_size,
                    Arc::clone(&exceeded),
                );

                let upload = Upload {
                    folder_id: folder_id.clone(),
                    file_name,
                    mime_type,
                    body,
                };
                return match state.drive.upload(&user.user_id, upload).await {
                    Ok(outcome) => Ok(JSend::success(outcome)),
                    Err(_) if exceeded.load(Ordering::Relaxed) => Err(too_large()),
                    Err(DriveError::Content(e)) => {
                        tracing::warn!(user_id = %user.user_id, "Upload aborted: {}", e);
                        Err(ApiError::bad_request("Upload was interrupted"))
                    }
                    Err(e) => Err(e.into()),
                };
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    Err(ApiError::bad_request("file field is required"))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileRecord>>, ApiError> {
    Ok(JSend::success(state.drive.get_file(&user.user_id, &id)?))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.drive.open_file(&user.user_id, &id).await?;
    tracing::debug!(file_id = %id, size = download.size, "Streaming file");
    Ok(stream_download(download))
}

pub async fn head_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state.drive.stat_file(&user.user_id, &id).await?;
    let mut response = StatusCode::OK.into_response();
    set_file_headers(&mut response, &file, file.size_bytes);
    Ok(response)
}

pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<RenameFileRequest>,
) -> Result<Json<JSend<FileRecord>>, ApiError> {
    let file = state
        .drive
        .rename_file(&user.user_id, &id, &req.original_name)
        .await?;
    Ok(JSend::success(file))
}

pub async fn move_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PlaceFileRequest>,
) -> Result<Json<JSend<FileRecord>>, ApiError> {
    let file = state
        .drive
        .move_file(&user.user_id, &id, non_empty(req.folder_id.as_deref()))
        .await?;
    Ok(JSend::success(file))
}

pub async fn copy_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    AppJson(req): AppJson<PlaceFileRequest>,
) -> Result<Json<JSend<FileRecord>>, ApiError> {
    let file = state
        .drive
        .copy_file(&user.user_id, &id, non_empty(req.folder_id.as_deref()))
        .await?;
    Ok(JSend::success(file))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    state.drive.delete_file(&user.user_id, &id).await?;
    Ok(JSend::success(()))
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<JSend<Vec<FileVersion>>>, ApiError> {
    Ok(JSend::success(state.drive.list_versions(&user.user_id, &id)?))
}

pub async fn restore_version(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((id, version_id)): Path<(String, String)>,
) -> Result<Json<JSend<FileRecord>>, ApiError> {
    let file = state
        .drive
        .restore_version(&user.user_id, &id, &version_id)
        .await?;
    Ok(JSend::success(file))
}

// ============================================================================
// Helpers
// ============================================================================

/// Treat an empty id the same as an absent one (the root).
pub(crate) fn non_empty(id: Option<&str>) -> Option<&str> {
    id.filter(|id| !id.is_empty())
}

/// Fail the stream once more than `limit` bytes have gone through it.
fn limit_size<'a, S>(stream: S, limit: u64, exceeded: Arc<AtomicBool>) -> ByteStream<'a>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'a,
{
    let mut seen: u64 = 0;
    stream
        .map(move |chunk| {
            let chunk = chunk?;
            seen += chunk.len() as u64;
            if seen > limit {
                exceeded.store(true, Ordering::Relaxed);
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "upload exceeds maximum size",
                ));
            }
            Ok(chunk)
        })
        .boxed()
}

pub(crate) fn stream_download(download: Download) -> Response {
    let Download { file, reader, size } = download;
    let mut response = Body::from_stream(ReaderStream::new(reader)).into_response();
    set_file_headers(&mut response, &file, size);
    response
}

fn set_file_headers(response: &mut Response, file: &FileRecord, size: u64) {
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));

    let filename: String = file
        .display_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}
