use std::sync::Arc;

use crate::boundary::NetworkBoundary;
use crate::library::{DownloadManager, LibraryCacheMerger, LibraryHandle};
use crate::store::LocalStore;
use crate::sync::connectivity::Connectivity;
use crate::sync::progress::ProgressSyncController;
use crate::sync::status::StatusSyncController;

#[derive(Clone)]
pub struct AppState {
    pub store: LocalStore,
    pub library: LibraryHandle,
    pub connectivity: Connectivity,
    pub progress: Arc<ProgressSyncController>,
    pub status: Arc<StatusSyncController>,
    pub merger: Arc<LibraryCacheMerger>,
    pub downloads: Arc<DownloadManager>,
    pub boundary: Arc<NetworkBoundary>,
}
