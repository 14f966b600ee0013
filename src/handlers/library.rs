use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::library::{LibraryError, RefreshOutcome};
use crate::library::downloads::DownloadOutcome;
use crate::models::{ComicEntry, Library, SeriesKey};
use crate::state::AppState;
use crate::utils::response::{ApiError, ApiResponse};

impl From<LibraryError> for ApiError {
    fn from(e: LibraryError) -> Self {
        match e {
            LibraryError::NotFound(what) => ApiError::NotFound(what),
            LibraryError::TooLarge { .. } => ApiError::BadRequest(e.to_string()),
            LibraryError::Store(inner) => ApiError::Internal(inner.to_string()),
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

pub async fn get_library(State(state): State<AppState>) -> Json<ApiResponse<Library>> {
    Json(ApiResponse::success(state.library.snapshot()))
}

pub async fn refresh_library(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RefreshOutcome>>, ApiError> {
    let outcome = state.merger.refresh().await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn get_series(
    State(state): State<AppState>,
    Path((root_folder, publisher, series_name)): Path<(String, String, String)>,
) -> Result<Json<ApiResponse<Vec<ComicEntry>>>, ApiError> {
    let key = SeriesKey {
        root_folder,
        publisher,
        series_name,
    };
    let comics = state.merger.ensure_series_details(&key).await?;
    Ok(Json(ApiResponse::success(comics)))
}

pub async fn list_downloads(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ComicEntry>>>, ApiError> {
    let comics = state
        .downloads
        .list()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ApiResponse::success(comics)))
}

pub async fn download_comic(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DownloadOutcome>>, ApiError> {
    let outcome = state.downloads.download(&id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn remove_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let removed = state
        .downloads
        .remove(&id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !removed {
        return Err(ApiError::NotFound(format!("Comic {} is not downloaded", id)));
    }
    Ok(Json(ApiResponse::success_null()))
}

#[derive(Deserialize)]
pub struct MangaMode {
    pub enabled: bool,
}

pub async fn set_manga_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<MangaMode>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let found = state
        .downloads
        .set_manga_mode(&id, payload.enabled)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    if !found {
        return Err(ApiError::NotFound(format!("Comic {} not found", id)));
    }
    Ok(Json(ApiResponse::success_null()))
}
