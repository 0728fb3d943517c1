//! Download queue handlers

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path as AxumPath, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::{ApiError, ApiResult};
use crate::core::models::{DownloadItem, QueueStats};
use crate::utils::file_utils::content_disposition;
use crate::AppState;

/// Payload polled by the UI every second
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueResponse {
    pub items: Vec<DownloadItem>,
    pub stats: QueueStats,
    pub is_processing: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddDownloadRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ClearCompletedResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RetryFailedResponse {
    pub retried: usize,
}

pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let manager = &state.download_manager;
    let items = manager.items();
    Json(QueueResponse {
        stats: QueueStats::from_items(&items),
        items,
        is_processing: manager.is_processing(),
    })
}

pub async fn add_to_queue(
    State(state): State<AppState>,
    payload: Result<Json<AddDownloadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DownloadItem>)> {
    let Json(request) = payload?;
    let item = state.download_manager.add_to_queue(&request.url).await?;
    tracing::info!("Added to queue via web UI: {} ({})", item.url, item.id);
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn remove_from_queue(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<StatusCode> {
    state.download_manager.remove_from_queue(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_completed(
    State(state): State<AppState>,
) -> ApiResult<Json<ClearCompletedResponse>> {
    let removed = state.download_manager.clear_completed().await?;
    Ok(Json(ClearCompletedResponse { removed }))
}

pub async fn retry_failed(State(state): State<AppState>) -> ApiResult<Json<RetryFailedResponse>> {
    let retried = state.download_manager.retry_failed().await?;
    Ok(Json(RetryFailedResponse { retried }))
}

/// Stream a completed download back to the browser as an attachment
pub async fn download_file(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Response> {
    let path = state.download_manager.download_file_path(&id)?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("File not found on disk"))?;
    let size = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("File not found on disk"))?
        .len();

    let disposition = HeaderValue::from_str(&content_disposition(&path))
        .map_err(|e| ApiError::internal(format!("Invalid file name: {}", e)))?;

    tracing::info!("Serving {} ({} bytes)", path.display(), size);

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));

    Ok(response)
}
