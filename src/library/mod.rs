pub mod api;
pub mod downloads;
pub mod merge;
pub mod merger;

pub use api::{HttpLibraryApi, LibraryApi, LibraryError};
pub use downloads::DownloadManager;
pub use merger::{
    FetchKind, LibraryCacheMerger, LibraryObserver, NoopObserver, ReconcileReport, RefreshOutcome,
    RenderMode,
};

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::Library;

/// The in-memory library shared by the UI, the merger and both sync
/// controllers.
///
/// All access goes through short synchronous closures; the lock is never
/// held across an `.await`. Code that suspends must look comics up again
/// after resuming, since another collaborator may have replaced the tree.
#[derive(Clone, Default)]
pub struct LibraryHandle {
    inner: Arc<RwLock<Library>>,
}

impl LibraryHandle {
    pub fn new(library: Library) -> Self {
        Self {
            inner: Arc::new(RwLock::new(library)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&Library) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Library) -> R) -> R {
        f(&mut self.write_guard())
    }

    pub fn replace(&self, library: Library) -> Library {
        std::mem::replace(&mut *self.write_guard(), library)
    }

    pub fn snapshot(&self) -> Library {
        self.read_guard().clone()
    }

    pub fn comic_path(&self, comic_id: &str) -> Option<String> {
        self.read(|lib| lib.find_comic(comic_id).map(|c| c.path.clone()))
    }

    // A panic inside a closure poisons the lock; the tree itself is still a
    // valid value, so keep serving it.
    fn read_guard(&self) -> RwLockReadGuard<'_, Library> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Library> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
