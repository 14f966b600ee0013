use axum::{
    extract::{Path, State},
    Json,
};
use sqlx::Row;
use std::collections::HashMap;

use crate::settings;
use crate::state::AppState;
use crate::utils::response::{ApiError, ApiResponse};

pub async fn list_settings(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HashMap<String, String>>>, ApiError> {
    let rows = sqlx::query("SELECT key, value FROM setting")
        .fetch_all(state.store.pool())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let map = rows
        .into_iter()
        .map(|row| (row.get("key"), row.get("value")))
        .collect();
    Ok(Json(ApiResponse::success(map)))
}

/// Takes effect on the next start; running controllers keep their values.
pub async fn update_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: String,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let value = body.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest("Setting value cannot be empty".into()));
    }
    settings::validate_setting(&key, value).map_err(ApiError::BadRequest)?;

    settings::set_setting(state.store.pool(), &key, value)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ApiResponse::success_null()))
}
