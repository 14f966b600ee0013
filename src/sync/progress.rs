use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::library::{merge, LibraryHandle};
use crate::models::{ProgressEntry, ProgressUpdate};
use crate::store::{LocalStore, StoreError};
use crate::sync::connectivity::Connectivity;
use crate::sync::device::{DeviceSync, RemoteProgress, SyncResult};
use crate::utils::time::now_millis;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSyncReport {
    /// Passes executed, including re-runs for triggers that arrived mid-run.
    pub passes: usize,
    pub synced: usize,
    pub skipped: usize,
    pub removed: usize,
    pub failed: usize,
}

impl ProgressSyncReport {
    fn absorb(&mut self, other: ProgressSyncReport) {
        self.passes += other.passes;
        self.synced += other.synced;
        self.skipped += other.skipped;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

enum Outcome {
    Synced,
    Skipped,
    Removed,
    Failed,
}

#[derive(Default)]
struct Flight {
    running: bool,
    pending: bool,
}

/// Pushes queued reading positions to the remote authority, one entry at a
/// time, with at most one run in flight.
pub struct ProgressSyncController {
    store: LocalStore,
    library: LibraryHandle,
    device: Arc<dyn DeviceSync>,
    connectivity: Connectivity,
    debounce_window: Duration,
    flight: Mutex<Flight>,
    // Bumped by every trigger; a debounce timer only fires if it is still
    // the latest one when its window closes.
    debounce_seq: AtomicU64,
    // Latest polled position per comic while it is ahead of this device.
    remote_ahead: Mutex<HashMap<String, RemoteProgress>>,
}

impl ProgressSyncController {
    pub fn new(
        store: LocalStore,
        library: LibraryHandle,
        device: Arc<dyn DeviceSync>,
        connectivity: Connectivity,
        debounce_window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            library,
            device,
            connectivity,
            debounce_window,
            flight: Mutex::new(Flight::default()),
            debounce_seq: AtomicU64::new(0),
            remote_ahead: Mutex::new(HashMap::new()),
        })
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    /// True while a trigger is waiting for connectivity or for the current
    /// run to finish.
    pub fn has_pending(&self) -> bool {
        self.flight().pending
    }

    /// Stores a page turn as unsynced, mirrors it into the in-memory library
    /// and schedules a debounced sync.
    pub async fn record_progress(
        self: &Arc<Self>,
        update: ProgressUpdate,
    ) -> Result<ProgressEntry, StoreError> {
        let comic_path = update
            .comic_path
            .filter(|p| !p.is_empty())
            .or_else(|| self.library.comic_path(&update.comic_id));

        let entry = ProgressEntry {
            id: update.comic_id,
            last_read_page: update.page,
            total_pages: update.total_pages,
            comic_path,
            synced: false,
            updated_at: now_millis(),
        };

        self.store.record_progress(&entry).await?;

        if entry.is_valid() {
            self.library.update(|lib| {
                if let Some(comic) = lib.find_comic_mut(&entry.id) {
                    merge::overlay_progress_entry(comic, &entry);
                }
            });
        }

        {
            let mut ahead = self.remote_ahead();
            if ahead.get(&entry.id).is_some_and(|r| r.page <= entry.last_read_page) {
                ahead.remove(&entry.id);
            }
        }

        self.schedule();
        Ok(entry)
    }

    /// Debounced trigger: the run starts once no new trigger has arrived for
    /// the whole window.
    pub fn schedule(self: &Arc<Self>) {
        let seq = self.debounce_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.debounce_window).await;
            if this.debounce_seq.load(Ordering::SeqCst) == seq {
                this.sync_now().await;
            }
        });
    }

    /// Immediate trigger, used on reconnect and app open. Supersedes any
    /// pending debounce timer.
    ///
    /// Returns `None` when the run was skipped: either offline, or another
    /// run is in flight and will pick this trigger up when it completes.
    pub async fn sync_now(&self) -> Option<ProgressSyncReport> {
        self.debounce_seq.fetch_add(1, Ordering::SeqCst);

        {
            let mut flight = self.flight();
            if !self.connectivity.is_online() {
                flight.pending = true;
                tracing::debug!("Offline, progress sync deferred");
                return None;
            }
            if flight.running {
                flight.pending = true;
                return None;
            }
            flight.running = true;
            flight.pending = false;
        }

        let mut report = ProgressSyncReport::default();
        loop {
            report.absorb(self.run_pass().await);

            let mut flight = self.flight();
            if flight.pending && self.connectivity.is_online() {
                flight.pending = false;
                continue;
            }
            flight.running = false;
            break;
        }

        Some(report)
    }

    /// Asks the device sync collaborator whether another device is ahead.
    pub async fn check_remote(&self, comic_id: &str, page: i64) -> SyncResult<Option<RemoteProgress>> {
        self.device.check_sync_status(comic_id, page).await
    }

    /// Watches another device's position on the comic that is open. Only
    /// one comic is watched at a time.
    pub async fn watch_remote(&self, comic_id: &str) {
        self.device.start_polling(comic_id).await;
    }

    pub async fn unwatch_remote(&self) {
        self.device.stop_polling().await;
        self.remote_ahead().clear();
    }

    /// The newest polled position of another device that is still ahead of
    /// the local one.
    pub fn remote_ahead_of(&self, comic_id: &str) -> Option<RemoteProgress> {
        self.remote_ahead().get(comic_id).cloned()
    }

    /// Collects the positions the device collaborator finds while polling.
    /// `None` when it never polls.
    pub fn listen_remote(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut updates = self.device.remote_updates()?;
        let this = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            loop {
                let remote = match updates.recv().await {
                    Ok(remote) => remote,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::debug!("Missed {} remote progress updates", missed);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(controller) = this.upgrade() else { break };
                controller.absorb_remote(remote);
            }
        }))
    }

    fn absorb_remote(&self, remote: RemoteProgress) {
        let local = self
            .library
            .read(|lib| lib.find_comic(&remote.comic_id).map(|c| c.progress.last_read_page));
        if local.is_some_and(|page| page >= remote.page) {
            return;
        }

        tracing::info!(
            "Device {} is ahead on {} at page {}",
            remote.device_id.as_deref().unwrap_or("unknown"),
            remote.comic_id,
            remote.page
        );
        self.remote_ahead().insert(remote.comic_id.clone(), remote);
    }

    async fn run_pass(&self) -> ProgressSyncReport {
        let mut report = ProgressSyncReport {
            passes: 1,
            ..Default::default()
        };

        let entries = match self.store.unsynced_progress().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read queued progress: {}", e);
                return report;
            }
        };

        if entries.is_empty() {
            return report;
        }

        for entry in entries {
            match self.sync_entry(entry).await {
                Outcome::Synced => report.synced += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Removed => report.removed += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        tracing::info!(
            "Progress sync pass: {} synced, {} skipped, {} removed, {} failed",
            report.synced,
            report.skipped,
            report.removed,
            report.failed
        );

        report
    }

    async fn sync_entry(&self, entry: ProgressEntry) -> Outcome {
        if !entry.is_valid() {
            tracing::warn!(
                "Skipping progress for {}: invalid page {} of {:?}",
                entry.id,
                entry.last_read_page,
                entry.total_pages
            );
            return Outcome::Skipped;
        }

        let comic_path = match self.resolve_path(&entry).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                tracing::info!("Comic {} no longer exists, dropping its progress", entry.id);
                if let Err(e) = self.store.delete_progress(&entry.id).await {
                    tracing::warn!("Failed to delete orphaned progress {}: {}", entry.id, e);
                    return Outcome::Failed;
                }
                return Outcome::Removed;
            }
            Err(e) => {
                tracing::warn!("Could not resolve comic {}: {}", entry.id, e);
                return Outcome::Failed;
            }
        };

        if let Err(e) = self.device.update_progress(&entry.id, entry.last_read_page).await {
            tracing::warn!("Failed to sync progress for {}: {}", entry.id, e);
            return Outcome::Failed;
        }

        // The tree may have been replaced while the request was in flight.
        self.library.update(|lib| {
            if let Some(comic) = lib.find_comic_mut(&entry.id) {
                merge::overlay_progress_entry(comic, &entry);
            }
        });

        match self
            .store
            .mark_progress_synced(&entry.id, entry.last_read_page, entry.total_pages, Some(&comic_path))
            .await
        {
            Ok(true) => Outcome::Synced,
            Ok(false) => {
                tracing::debug!("Progress for {} changed during delivery, keeping it queued", entry.id);
                Outcome::Failed
            }
            Err(e) => {
                tracing::warn!("Delivered progress for {} but could not mark it synced: {}", entry.id, e);
                Outcome::Failed
            }
        }
    }

    /// The entry's own path, else the in-memory library, else the mirror of
    /// a downloaded comic.
    async fn resolve_path(&self, entry: &ProgressEntry) -> Result<Option<String>, StoreError> {
        if let Some(path) = entry.comic_path.as_ref().filter(|p| !p.is_empty()) {
            return Ok(Some(path.clone()));
        }
        if let Some(path) = self.library.comic_path(&entry.id) {
            return Ok(Some(path));
        }
        Ok(self
            .store
            .comic_info(&entry.id)
            .await?
            .map(|info| info.path)
            .filter(|p| !p.is_empty()))
    }

    fn flight(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remote_ahead(&self) -> MutexGuard<'_, HashMap<String, RemoteProgress>> {
        self.remote_ahead.lock().unwrap_or_else(|e| e.into_inner())
    }
}
