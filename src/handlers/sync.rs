use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::{ProgressEntry, ProgressUpdate, ReadStatus, SeriesKey, StatusEntry};
use crate::state::AppState;
use crate::sync::device::RemoteProgress;
use crate::sync::progress::ProgressSyncReport;
use crate::sync::status::StatusSyncReport;
use crate::utils::response::{ApiError, ApiResponse};

pub async fn record_progress(
    State(state): State<AppState>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<ApiResponse<ProgressEntry>>, ApiError> {
    if update.page < 0 {
        return Err(ApiError::BadRequest("page must be zero or greater".into()));
    }

    let entry = state
        .progress
        .record_progress(update)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse::success(entry)))
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: i64,
}

pub async fn check_remote_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Option<RemoteProgress>>>, ApiError> {
    let remote = state
        .progress
        .check_remote(&id, query.page)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(ApiResponse::success(remote)))
}

/// Position another device reached while the comic was being watched.
pub async fn remote_ahead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<Option<RemoteProgress>>> {
    Json(ApiResponse::success(state.progress.remote_ahead_of(&id)))
}

/// Called when the reader opens a comic.
pub async fn watch_remote_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<ApiResponse<()>> {
    state.progress.watch_remote(&id).await;
    Json(ApiResponse::success_null())
}

pub async fn unwatch_remote_progress(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.progress.unwatch_remote().await;
    Json(ApiResponse::success_null())
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: ReadStatus,
}

pub async fn mark_comic_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<ApiResponse<StatusEntry>>, ApiError> {
    let entry = state
        .status
        .mark_comic(&id, body.status)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse::success(entry)))
}

#[derive(Deserialize)]
pub struct SeriesStatusBody {
    #[serde(flatten)]
    pub series: SeriesKey,
    pub status: ReadStatus,
}

pub async fn mark_series_status(
    State(state): State<AppState>,
    Json(body): Json<SeriesStatusBody>,
) -> Result<Json<ApiResponse<StatusEntry>>, ApiError> {
    let entry = state
        .status
        .mark_series(body.series, body.status)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse::success(entry)))
}

#[derive(Serialize)]
pub struct SyncSummary {
    pub online: bool,
    pub progress: Option<ProgressSyncReport>,
    pub status: Option<StatusSyncReport>,
}

/// Immediate flush of both queues.
pub async fn sync_now(State(state): State<AppState>) -> Json<ApiResponse<SyncSummary>> {
    let progress = state.progress.sync_now().await;
    let status = state.status.sync_pending().await;

    Json(ApiResponse::success(SyncSummary {
        online: state.connectivity.is_online(),
        progress,
        status,
    }))
}

#[derive(Deserialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

/// Lets the page forward its own online/offline events.
pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(body): Json<ConnectivityBody>,
) -> Json<ApiResponse<()>> {
    state.connectivity.set_online(body.online);
    Json(ApiResponse::success_null())
}
