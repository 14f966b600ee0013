use serde::Serialize;
use std::sync::Arc;

use crate::library::api::{LibraryApi, LibraryError};
use crate::library::LibraryHandle;
use crate::models::{ComicEntry, ComicRecord};
use crate::store::{LocalStore, StoreError};
use crate::utils::time::now_millis;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub comic_id: String,
    pub bytes: usize,
    /// Older downloads removed to stay under the storage quota.
    pub evicted: Vec<String>,
}

/// Offline copies of comics, bounded by a storage quota.
pub struct DownloadManager {
    store: LocalStore,
    library: LibraryHandle,
    api: Arc<dyn LibraryApi>,
    quota: u64,
}

impl DownloadManager {
    pub fn new(store: LocalStore, library: LibraryHandle, api: Arc<dyn LibraryApi>, quota: u64) -> Self {
        Self {
            store,
            library,
            api,
            quota,
        }
    }

    pub async fn download(&self, comic_id: &str) -> Result<DownloadOutcome, LibraryError> {
        let Some(info) = self.library.read(|lib| lib.find_comic(comic_id).cloned()) else {
            return Err(LibraryError::NotFound(format!("comic {}", comic_id)));
        };

        let blob = self.api.download(comic_id).await?;
        let bytes = blob.len();
        if bytes as u64 > self.quota {
            return Err(LibraryError::TooLarge {
                comic_id: comic_id.to_string(),
                bytes,
            });
        }

        let mut comic_info = info;
        comic_info.downloaded = true;
        if let Some(progress) = self.store.get_progress(comic_id).await? {
            comic_info.progress.last_read_page = progress.last_read_page;
            if let Some(total) = progress.total_pages {
                comic_info.progress.total_pages = total;
            }
        }

        self.store
            .put_comic(&ComicRecord {
                id: comic_id.to_string(),
                comic_info,
                file_blob: blob,
                downloaded_at: now_millis(),
            })
            .await?;

        let evicted = self.enforce_quota().await?;

        self.library.update(|lib| {
            if let Some(comic) = lib.find_comic_mut(comic_id) {
                comic.downloaded = !evicted.iter().any(|id| id == comic_id);
            }
        });

        tracing::info!("Downloaded comic {} ({} bytes)", comic_id, bytes);
        Ok(DownloadOutcome {
            comic_id: comic_id.to_string(),
            bytes,
            evicted,
        })
    }

    pub async fn list(&self) -> Result<Vec<ComicEntry>, StoreError> {
        self.store.downloaded_comics().await
    }

    pub async fn remove(&self, comic_id: &str) -> Result<bool, StoreError> {
        let removed = self.store.delete_comic(comic_id).await?;
        if removed {
            self.library.update(|lib| {
                if let Some(comic) = lib.find_comic_mut(comic_id) {
                    comic.downloaded = false;
                }
            });
        }
        Ok(removed)
    }

    pub async fn set_manga_mode(&self, comic_id: &str, enabled: bool) -> Result<bool, StoreError> {
        let stored = self.store.set_manga_mode(comic_id, enabled).await?;
        let in_memory = self.library.update(|lib| match lib.find_comic_mut(comic_id) {
            Some(comic) => {
                comic.manga_mode = enabled;
                true
            }
            None => false,
        });
        Ok(stored || in_memory)
    }

    /// Evicts the oldest downloads while the stored blobs exceed the quota.
    pub async fn enforce_quota(&self) -> Result<Vec<String>, StoreError> {
        let evicted = self.store.evict_until_fits(self.quota).await?;
        if !evicted.is_empty() {
            tracing::warn!("Storage quota reached, evicted {} download(s)", evicted.len());
            self.library.update(|lib| {
                for comic in lib.comics_mut() {
                    if evicted.contains(&comic.id) {
                        comic.downloaded = false;
                    }
                }
            });
        }
        Ok(evicted)
    }
}
