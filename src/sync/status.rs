use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::library::{merge, LibraryHandle};
use crate::models::{Progress, ReadStatus, SeriesKey, StatusEntry, StatusTarget};
use crate::store::{LocalStore, StoreError};
use crate::sync::connectivity::Connectivity;
use crate::sync::device::SyncError;
use crate::sync::remote::StatusRemote;
use crate::utils::time::now_millis;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSyncReport {
    pub synced: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl StatusSyncReport {
    fn absorb(&mut self, other: StatusSyncReport) {
        self.synced += other.synced;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
    }
}

#[derive(Default)]
struct Flight {
    running: bool,
    pending: bool,
}

/// Pushes queued read/unread events to the remote authority.
pub struct StatusSyncController {
    store: LocalStore,
    library: LibraryHandle,
    remote: Arc<dyn StatusRemote>,
    connectivity: Connectivity,
    timeout: Duration,
    flight: Mutex<Flight>,
}

impl StatusSyncController {
    pub fn new(
        store: LocalStore,
        library: LibraryHandle,
        remote: Arc<dyn StatusRemote>,
        connectivity: Connectivity,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            library,
            remote,
            connectivity,
            timeout,
            flight: Mutex::new(Flight::default()),
        })
    }

    pub async fn mark_comic(&self, comic_id: &str, status: ReadStatus) -> Result<StatusEntry, StoreError> {
        let target = StatusTarget::Comic {
            comic_id: comic_id.to_string(),
        };
        self.record(target, status).await
    }

    pub async fn mark_series(&self, series: SeriesKey, status: ReadStatus) -> Result<StatusEntry, StoreError> {
        self.record(StatusTarget::Series(series), status).await
    }

    async fn record(&self, target: StatusTarget, status: ReadStatus) -> Result<StatusEntry, StoreError> {
        let mut entry = StatusEntry::new(target, status, now_millis());
        entry.key = Some(self.store.put_status(&entry).await?);

        let touched = self.library.update(|lib| {
            merge::apply_status_entry(lib, &entry)
                .into_iter()
                .filter_map(|id| lib.find_comic(&id).map(|c| (id, c.progress)))
                .collect::<Vec<_>>()
        });

        // A comic the in-memory tree does not hold still has its own stored
        // progress rewritten.
        let touched = if touched.is_empty() {
            match &entry.target {
                StatusTarget::Comic { comic_id } => vec![(comic_id.clone(), Progress::default())],
                StatusTarget::Series(_) => Vec::new(),
            }
        } else {
            touched
        };

        for (comic_id, progress) in touched {
            self.rewrite_progress(&comic_id, progress, status).await?;
        }

        tracing::info!("Marked {} {} as {}", entry.target.kind(), describe(&entry.target), status);

        if self.connectivity.is_online() {
            self.sync_pending().await;
        }

        Ok(entry)
    }

    /// Keeps an existing progress row consistent with the status shortcut.
    /// The row is left unsynced so the new position is delivered as well.
    async fn rewrite_progress(
        &self,
        comic_id: &str,
        in_memory: Progress,
        status: ReadStatus,
    ) -> Result<(), StoreError> {
        let Some(mut entry) = self.store.get_progress(comic_id).await? else {
            return Ok(());
        };

        let mut progress = Progress {
            last_read_page: entry.last_read_page,
            total_pages: entry.total_pages.unwrap_or(in_memory.total_pages),
        };
        merge::apply_status(&mut progress, status);

        entry.last_read_page = progress.last_read_page;
        entry.total_pages = Some(progress.total_pages);
        entry.synced = false;
        entry.updated_at = now_millis();
        self.store.record_progress(&entry).await
    }

    /// Sequential passes over unsynced events. `None` when offline or when
    /// another run is in flight; that run makes one more pass for this
    /// trigger before it returns.
    pub async fn sync_pending(&self) -> Option<StatusSyncReport> {
        {
            let mut flight = self.flight();
            if !self.connectivity.is_online() {
                return None;
            }
            if flight.running {
                flight.pending = true;
                return None;
            }
            flight.running = true;
            flight.pending = false;
        }

        let mut report = StatusSyncReport::default();
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

    async fn run_pass(&self) -> StatusSyncReport {
        let mut report = StatusSyncReport::default();

        let entries = match self.store.unsynced_statuses().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read queued statuses: {}", e);
                return report;
            }
        };

        for entry in entries {
            let Some(key) = entry.key else { continue };

            let delivery = match tokio::time::timeout(self.timeout, self.remote.send_status(&entry)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout(self.timeout)),
            };

            match delivery {
                Ok(()) => match self.store.mark_status_synced(key).await {
                    Ok(_) => report.synced += 1,
                    Err(e) => {
                        tracing::warn!("Delivered status {} but could not mark it synced: {}", key, e);
                        report.failed += 1;
                    }
                },
                Err(SyncError::Timeout(after)) => {
                    tracing::warn!(
                        "Status sync for {} timed out after {} ms",
                        describe(&entry.target),
                        after.as_millis()
                    );
                    report.timed_out += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to sync status for {}: {}", describe(&entry.target), e);
                    report.failed += 1;
                }
            }
        }

        if report.synced + report.failed + report.timed_out > 0 {
            tracing::info!(
                "Status sync pass: {} synced, {} failed, {} timed out",
                report.synced,
                report.failed,
                report.timed_out
            );
        }

        report
    }

    fn flight(&self) -> MutexGuard<'_, Flight> {
        self.flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn describe(target: &StatusTarget) -> String {
    match target {
        StatusTarget::Comic { comic_id } => comic_id.clone(),
        StatusTarget::Series(key) => format!("{}/{}/{}", key.root_folder, key.publisher, key.series_name),
    }
}
