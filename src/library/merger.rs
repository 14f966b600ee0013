use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::library::api::{LibraryApi, LibraryError};
use crate::library::{merge, LibraryHandle};
use crate::models::{ComicEntry, Library, LibraryCacheSnapshot, Series, SeriesKey};
use crate::settings::Tunables;
use crate::store::{LocalStore, StoreError};
use crate::sync::device::DeviceSync;
use crate::utils::time::now_millis;

/// Comics handed to the observer between two cooperative yields when a large
/// library is rendered in chunks.
const RENDER_CHUNK_SIZE: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchKind {
    Progressive,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Inline,
    Chunked { chunks: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub kind: FetchKind,
    pub comic_count: usize,
    pub render: RenderMode,
}

/// Results of one reconciliation pass. A `None` marks a step that failed;
/// the failure is logged and the other steps still run.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub refreshed: Option<RefreshOutcome>,
    pub device_initialized: Option<()>,
    pub pruned: Option<Vec<String>>,
    pub downloaded: Option<usize>,
}

/// Rendering hooks of the UI layer.
pub trait LibraryObserver: Send + Sync {
    fn library_replaced(&self, _comic_count: usize) {}

    fn series_ready(&self, _key: &SeriesKey, _comics: &[ComicEntry]) {}
}

pub struct NoopObserver;

impl LibraryObserver for NoopObserver {}

/// Keeps the in-memory library consistent with the local store and the
/// remote library.
pub struct LibraryCacheMerger {
    store: LocalStore,
    library: LibraryHandle,
    api: Arc<dyn LibraryApi>,
    device: Arc<dyn DeviceSync>,
    observer: Arc<dyn LibraryObserver>,
    stale_after: Duration,
    chunk_threshold: usize,
    refresh_lock: Mutex<()>,
}

impl LibraryCacheMerger {
    pub fn new(
        store: LocalStore,
        library: LibraryHandle,
        api: Arc<dyn LibraryApi>,
        device: Arc<dyn DeviceSync>,
        tunables: &Tunables,
    ) -> Self {
        Self {
            store,
            library,
            api,
            device,
            observer: Arc::new(NoopObserver),
            stale_after: tunables.library_stale_after,
            chunk_threshold: tunables.chunk_threshold,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LibraryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn library(&self) -> &LibraryHandle {
        &self.library
    }

    pub fn is_stale(&self, snapshot: &LibraryCacheSnapshot, now_ms: i64) -> bool {
        snapshot.is_stale(now_ms, self.stale_after)
    }

    /// Puts the stored snapshot, with local facts folded in, into memory.
    /// Returns the snapshot's capture time.
    pub async fn load_cached(&self) -> Result<Option<i64>, StoreError> {
        let Some(snapshot) = self.store.load_snapshot().await? else {
            return Ok(None);
        };

        let mut data = snapshot.data;
        self.fold_local_state(&mut data).await?;

        let count = data.comic_count();
        self.library.replace(data);
        self.observer.library_replaced(count);

        tracing::info!("Loaded cached library with {} comics", count);
        Ok(Some(snapshot.timestamp))
    }

    /// Re-applies stored progress and pending statuses to the in-memory tree.
    pub async fn merge_local_state(&self) -> Result<(), StoreError> {
        let progress = self.store.get_all_progress().await?;
        let statuses = self.store.unsynced_statuses().await?;
        self.library
            .update(|lib| merge::merge_offline_state(lib, &progress, &statuses));
        Ok(())
    }

    /// Fetches the library, progressively when the server supports it, folds
    /// local facts in, persists the snapshot and swaps it into memory.
    pub async fn refresh(&self) -> Result<RefreshOutcome, LibraryError> {
        let _guard = self.refresh_lock.lock().await;

        let (mut fresh, kind) = match self.api.fetch_structure().await {
            Ok(structure) => (structure, FetchKind::Progressive),
            Err(e) => {
                tracing::debug!("Progressive library fetch unavailable ({}), fetching full tree", e);
                let mut full = self.api.fetch_full().await?;
                full.mark_fully_loaded();
                (full, FetchKind::Full)
            }
        };

        self.fold_local_state(&mut fresh).await?;

        let timestamp = now_millis();
        self.store
            .save_snapshot(&LibraryCacheSnapshot {
                data: fresh.clone(),
                timestamp,
            })
            .await?;

        let comic_count = fresh.comic_count();
        self.library.replace(fresh);

        let render = match kind {
            FetchKind::Full => self.render(comic_count).await,
            FetchKind::Progressive => {
                self.observer.library_replaced(comic_count);
                RenderMode::Inline
            }
        };

        tracing::info!(
            "Library refreshed ({:?} fetch): {} comics loaded",
            kind,
            comic_count
        );

        Ok(RefreshOutcome {
            kind,
            comic_count,
            render,
        })
    }

    /// Comic list of one series, fetched on first access.
    pub async fn ensure_series_details(&self, key: &SeriesKey) -> Result<Vec<ComicEntry>, LibraryError> {
        let cached = self.library.read(|lib| {
            lib.series(key)
                .filter(|s| s.has_details)
                .map(|s| s.comics.clone())
        });
        if let Some(comics) = cached {
            return Ok(comics);
        }

        let comics = self.api.fetch_series(key).await?;
        let count = comics.len();

        let mut detail = Library::default();
        detail.insert_series(
            key,
            Series {
                comics,
                has_details: true,
                comic_count: Some(count),
            },
        );
        self.fold_local_state(&mut detail).await?;

        let series = detail.series(key).cloned().unwrap_or_default();

        // Only attach the list if the series is still part of the tree.
        let attached = self.library.update(|lib| match lib.series_mut(key) {
            Some(existing) => {
                *existing = series.clone();
                true
            }
            None => false,
        });

        if attached {
            self.observer.series_ready(key, &series.comics);
            let data = self.library.snapshot();
            if let Err(e) = self.store.update_snapshot_data(&data).await {
                tracing::warn!("Could not persist details of {:?}: {}", key, e);
            }
        }

        Ok(series.comics)
    }

    /// Load-time and periodic upkeep: trust a fresh cached snapshot,
    /// refresh a stale one, then run the independent background steps side
    /// by side.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let snapshot = match self.store.load_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Could not read cached library: {}", e);
                None
            }
        };

        if let Some(cached) = &snapshot {
            if self.library.read(|lib| lib.is_empty()) {
                if let Err(e) = self.load_cached().await {
                    tracing::warn!("Could not load cached library: {}", e);
                }
            } else if let Err(e) = self.merge_local_state().await {
                tracing::warn!("Could not merge local state: {}", e);
            }

            let age = cached.age(now_millis());
            tracing::debug!("Cached library is {} s old", age.as_secs());
        }

        let needs_refresh = match &snapshot {
            Some(cached) => self.is_stale(cached, now_millis()),
            None => true,
        };

        if needs_refresh {
            report.refreshed = match self.refresh().await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::warn!("Library refresh failed: {}", e);
                    None
                }
            };
        }

        let (device, pruned, downloaded) = tokio::join!(
            async {
                self.device
                    .initialize()
                    .await
                    .map_err(|e| tracing::warn!("Device initialization failed: {}", e))
                    .ok()
            },
            async {
                self.prune_stale_downloads()
                    .await
                    .map_err(|e| tracing::warn!("Pruning stale downloads failed: {}", e))
                    .ok()
            },
            async {
                self.rebuild_downloaded()
                    .await
                    .map_err(|e| tracing::warn!("Rebuilding downloaded comics failed: {}", e))
                    .ok()
            },
        );

        report.device_initialized = device;
        report.pruned = pruned;
        report.downloaded = downloaded;
        report
    }

    /// Deletes downloads whose comic the server no longer lists. Only runs
    /// against a tree with every series expanded, since a skeleton cannot
    /// prove a comic is gone.
    pub async fn prune_stale_downloads(&self) -> Result<Vec<String>, StoreError> {
        let known: Option<HashSet<String>> = self.library.read(|lib| {
            if lib.is_empty() || !lib.is_fully_loaded() {
                None
            } else {
                Some(lib.comics().map(|c| c.id.clone()).collect())
            }
        });
        let Some(known) = known else {
            return Ok(Vec::new());
        };

        let mut pruned = Vec::new();
        for id in self.store.downloaded_ids().await? {
            if known.contains(&id) {
                continue;
            }
            // The tree may have been refreshed during the previous delete.
            if self.library.read(|lib| lib.find_comic(&id).is_some()) {
                continue;
            }
            if self.store.delete_comic(&id).await? {
                tracing::info!("Removed stale download {}", id);
                pruned.push(id);
            }
        }
        Ok(pruned)
    }

    /// Flags in-memory entries that have a local download. Returns the number
    /// of downloads on disk.
    pub async fn rebuild_downloaded(&self) -> Result<usize, StoreError> {
        let ids: HashSet<String> = self.store.downloaded_ids().await?.into_iter().collect();
        self.library.update(|lib| {
            for comic in lib.comics_mut() {
                comic.downloaded = ids.contains(&comic.id);
            }
        });
        Ok(ids.len())
    }

    async fn fold_local_state(&self, library: &mut Library) -> Result<(), StoreError> {
        let progress = self.store.get_all_progress().await?;
        let statuses = self.store.unsynced_statuses().await?;
        let downloaded: HashSet<String> = self.store.downloaded_ids().await?.into_iter().collect();

        merge::merge_offline_state(library, &progress, &statuses);
        for comic in library.comics_mut() {
            comic.downloaded = downloaded.contains(&comic.id);
        }
        Ok(())
    }

    /// Small libraries are announced in one go. Above the threshold the
    /// series are handed over in chunks with a yield in between so the
    /// runtime can serve other work.
    async fn render(&self, comic_count: usize) -> RenderMode {
        if comic_count <= self.chunk_threshold {
            self.observer.library_replaced(comic_count);
            return RenderMode::Inline;
        }

        let keys: Vec<SeriesKey> = self
            .library
            .read(|lib| lib.iter_series().map(|(key, _)| key).collect());

        let mut chunks = 0;
        let mut in_chunk = 0;
        for key in keys {
            let comics = self.library.read(|lib| lib.series(&key).map(|s| s.comics.clone()));
            let Some(comics) = comics else { continue };

            self.observer.series_ready(&key, &comics);
            in_chunk += comics.len();
            if in_chunk >= RENDER_CHUNK_SIZE {
                chunks += 1;
                in_chunk = 0;
                tokio::task::yield_now().await;
            }
        }
        if in_chunk > 0 {
            chunks += 1;
        }

        self.observer.library_replaced(comic_count);
        RenderMode::Chunked { chunks }
    }
}
