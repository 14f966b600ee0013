#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use comic_sync::boundary::{BoundaryConfig, BoundaryError, NetworkBoundary, ProxyRequest, Upstream};
use comic_sync::cache::{CacheStorage, CachedResponse};
use comic_sync::library::{DownloadManager, LibraryApi, LibraryCacheMerger, LibraryError, LibraryHandle};
use comic_sync::models::{ComicEntry, Library, Progress, Series, SeriesKey, StatusEntry};
use comic_sync::settings::Tunables;
use comic_sync::state::AppState;
use comic_sync::store::LocalStore;
use comic_sync::sync::device::RemoteProgress;
use comic_sync::sync::{
    Connectivity, DeviceSync, ProgressSyncController, StatusRemote, StatusSyncController, SyncError,
    SyncResult,
};

pub fn comic(id: &str, last_read_page: i64, total_pages: i64) -> ComicEntry {
    ComicEntry {
        id: id.to_string(),
        name: format!("Issue {}", id),
        path: format!("/library/{}.cbz", id),
        progress: Progress {
            last_read_page,
            total_pages,
        },
        manga_mode: false,
        downloaded: false,
    }
}

pub fn saga_key() -> SeriesKey {
    SeriesKey::new("Comics", "Image", "Saga")
}

/// One series holding the given comics, fully loaded.
pub fn library_with(comics: Vec<ComicEntry>) -> Library {
    let mut library = Library::default();
    library.insert_series(
        &saga_key(),
        Series {
            comics,
            has_details: true,
            comic_count: None,
        },
    );
    library
}

/// `series` series of `per_series` comics each, fully loaded.
pub fn large_library(series: usize, per_series: usize) -> Library {
    let mut library = Library::default();
    for s in 0..series {
        let comics = (0..per_series)
            .map(|c| comic(&format!("{}-{}", s, c), 0, 20))
            .collect();
        library.insert_series(
            &SeriesKey::new("Comics", "Publisher", &format!("Series {}", s)),
            Series {
                comics,
                has_details: true,
                comic_count: None,
            },
        );
    }
    library
}

pub struct RecordingDevice {
    pub calls: Mutex<Vec<(String, i64)>>,
    pub failing: Mutex<HashSet<String>>,
    pub delay: Mutex<Option<Duration>>,
    pub fail_initialize: AtomicBool,
    pub initialized: AtomicUsize,
    pub watching: Mutex<Option<String>>,
    pub polled: broadcast::Sender<RemoteProgress>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        let (polled, _) = broadcast::channel(16);
        Self {
            calls: Mutex::default(),
            failing: Mutex::default(),
            delay: Mutex::default(),
            fail_initialize: AtomicBool::new(false),
            initialized: AtomicUsize::new(0),
            watching: Mutex::default(),
            polled,
        }
    }
}

impl RecordingDevice {
    /// Hands a position to listeners as if the poller had found it.
    pub fn report_remote(&self, comic_id: &str, page: i64) {
        let _ = self.polled.send(RemoteProgress {
            comic_id: comic_id.to_string(),
            page,
            device_id: Some("device-other".into()),
            updated_at: None,
        });
    }

    pub fn calls(&self) -> Vec<(String, i64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_for(&self, comic_id: &str) {
        self.failing.lock().unwrap().insert(comic_id.to_string());
    }
}

#[async_trait]
impl DeviceSync for RecordingDevice {
    fn device_id(&self) -> &str {
        "device-test"
    }

    async fn update_progress(&self, comic_id: &str, page: i64) -> SyncResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(comic_id) {
            return Err(SyncError::HttpError("connection reset".into()));
        }
        self.calls.lock().unwrap().push((comic_id.to_string(), page));
        Ok(())
    }

    async fn start_polling(&self, comic_id: &str) {
        *self.watching.lock().unwrap() = Some(comic_id.to_string());
    }

    async fn stop_polling(&self) {
        self.watching.lock().unwrap().take();
    }

    fn remote_updates(&self) -> Option<broadcast::Receiver<RemoteProgress>> {
        Some(self.polled.subscribe())
    }

    async fn initialize(&self) -> SyncResult<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected(500));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRemote {
    pub sent: Mutex<Vec<StatusEntry>>,
    pub delay: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
}

impl RecordingRemote {
    pub fn sent(&self) -> Vec<StatusEntry> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusRemote for RecordingRemote {
    async fn send_status(&self, entry: &StatusEntry) -> SyncResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected(503));
        }
        self.sent.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLibraryApi {
    /// `None` makes the progressive endpoint unavailable.
    pub structure: Mutex<Option<Library>>,
    pub full: Mutex<Library>,
    pub series: Mutex<HashMap<SeriesKey, Vec<ComicEntry>>>,
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    pub structure_calls: AtomicUsize,
    pub full_calls: AtomicUsize,
    pub series_calls: AtomicUsize,
}

impl MockLibraryApi {
    pub fn full(library: Library) -> Self {
        let api = Self::default();
        *api.full.lock().unwrap() = library;
        api
    }

    pub fn fetches(&self) -> usize {
        self.structure_calls.load(Ordering::SeqCst) + self.full_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LibraryApi for MockLibraryApi {
    async fn fetch_full(&self) -> Result<Library, LibraryError> {
        self.full_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.full.lock().unwrap().clone())
    }

    async fn fetch_structure(&self) -> Result<Library, LibraryError> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        self.structure
            .lock()
            .unwrap()
            .clone()
            .ok_or(LibraryError::Status(404))
    }

    async fn fetch_series(&self, key: &SeriesKey) -> Result<Vec<ComicEntry>, LibraryError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        self.series
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(format!("{:?}", key)))
    }

    async fn download(&self, comic_id: &str) -> Result<Vec<u8>, LibraryError> {
        self.blobs
            .lock()
            .unwrap()
            .get(comic_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(comic_id.to_string()))
    }
}

#[derive(Default)]
pub struct MockUpstream {
    pub offline: AtomicBool,
    pub responses: Mutex<HashMap<String, CachedResponse>>,
    pub fetched: Mutex<Vec<String>>,
}

impl MockUpstream {
    pub fn serve(&self, path: &str, content_type: &str, body: &'static str) {
        self.responses.lock().unwrap().insert(
            path.to_string(),
            CachedResponse {
                status: 200,
                headers: vec![("content-type".to_string(), content_type.to_string())],
                body: Bytes::from_static(body.as_bytes()),
            },
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn fetch(&self, request: &ProxyRequest) -> Result<CachedResponse, BoundaryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BoundaryError::Network("connection refused".into()));
        }
        self.fetched.lock().unwrap().push(request.path_and_query.clone());
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&request.path_and_query)
            .cloned()
            .unwrap_or(CachedResponse {
                status: 404,
                headers: Vec::new(),
                body: Bytes::from_static(b"not found"),
            }))
    }
}

pub fn test_tunables() -> Tunables {
    Tunables {
        progress_debounce: Duration::from_secs(60),
        status_timeout: Duration::from_millis(500),
        library_stale_after: Duration::from_secs(300),
        chunk_threshold: 1000,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub device: Arc<RecordingDevice>,
    pub remote: Arc<RecordingRemote>,
    pub api: Arc<MockLibraryApi>,
    pub upstream: Arc<MockUpstream>,
}

pub async fn test_app(library: Library) -> TestApp {
    let store = LocalStore::open_in_memory().await.unwrap();
    let library = LibraryHandle::new(library);
    let connectivity = Connectivity::new(true);
    let tunables = test_tunables();

    let device = Arc::new(RecordingDevice::default());
    let remote = Arc::new(RecordingRemote::default());
    let api = Arc::new(MockLibraryApi::default());
    let upstream = Arc::new(MockUpstream::default());

    let progress = ProgressSyncController::new(
        store.clone(),
        library.clone(),
        device.clone(),
        connectivity.clone(),
        tunables.progress_debounce,
    );
    progress.listen_remote();
    let status = StatusSyncController::new(
        store.clone(),
        library.clone(),
        remote.clone(),
        connectivity.clone(),
        tunables.status_timeout,
    );
    let merger = Arc::new(LibraryCacheMerger::new(
        store.clone(),
        library.clone(),
        api.clone(),
        device.clone(),
        &tunables,
    ));
    let downloads = Arc::new(DownloadManager::new(store.clone(), library.clone(), api.clone(), 1024));
    let boundary = Arc::new(NetworkBoundary::new(
        BoundaryConfig::new("v1", "/"),
        Arc::new(CacheStorage::new()),
        upstream.clone(),
    ));

    TestApp {
        state: AppState {
            store,
            library,
            connectivity,
            progress,
            status,
            merger,
            downloads,
            boundary,
        },
        device,
        remote,
        api,
        upstream,
    }
}
