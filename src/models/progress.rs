use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: String,
    pub last_read_page: i64,
    pub total_pages: Option<i64>,
    pub comic_path: Option<String>,
    pub synced: bool,
    pub updated_at: i64,
}

impl ProgressEntry {
    pub fn is_valid(&self) -> bool {
        self.last_read_page >= 0 && self.total_pages.map_or(true, |t| t >= 0)
    }
}

/// A page turn reported by the reader.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub comic_id: String,
    pub page: i64,
    pub total_pages: Option<i64>,
    pub comic_path: Option<String>,
}
