use serde::{Deserialize, Serialize};

use crate::models::ComicEntry;

/// A downloaded comic held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicRecord {
    pub id: String,
    pub comic_info: ComicEntry,
    #[serde(skip)]
    pub file_blob: Vec<u8>,
    pub downloaded_at: i64,
}
