mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use comic_sync::library::LibraryHandle;
use comic_sync::models::{ProgressEntry, ReadStatus, StatusTarget};
use comic_sync::store::LocalStore;
use comic_sync::sync::{Connectivity, StatusSyncController};
use common::{comic, library_with, saga_key, RecordingRemote};

struct Fixture {
    store: LocalStore,
    library: LibraryHandle,
    connectivity: Connectivity,
    remote: Arc<RecordingRemote>,
    controller: Arc<StatusSyncController>,
}

async fn fixture(online: bool, timeout: Duration) -> Fixture {
    let store = LocalStore::open_in_memory().await.unwrap();
    let library = LibraryHandle::new(library_with(vec![
        comic("c1", 4, 24),
        comic("c2", 0, 30),
        comic("c3", 0, 0),
    ]));
    let connectivity = Connectivity::new(online);
    let remote = Arc::new(RecordingRemote::default());
    let controller = StatusSyncController::new(
        store.clone(),
        library.clone(),
        remote.clone(),
        connectivity.clone(),
        timeout,
    );
    Fixture {
        store,
        library,
        connectivity,
        remote,
        controller,
    }
}

fn progress_of(library: &LibraryHandle, id: &str) -> (i64, i64) {
    library.read(|lib| {
        let comic = lib.find_comic(id).unwrap();
        (comic.progress.last_read_page, comic.progress.total_pages)
    })
}

#[tokio::test]
async fn test_read_then_unread_round_trip() {
    let fx = fixture(false, Duration::from_millis(500)).await;

    fx.controller.mark_comic("c1", ReadStatus::Read).await.unwrap();
    assert_eq!(progress_of(&fx.library, "c1"), (23, 24));

    fx.controller.mark_comic("c1", ReadStatus::Unread).await.unwrap();
    assert_eq!(progress_of(&fx.library, "c1"), (0, 24));

    let pending = fx.store.unsynced_statuses().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].status, ReadStatus::Read);
    assert_eq!(pending[1].status, ReadStatus::Unread);
}

#[tokio::test]
async fn test_read_with_unknown_total() {
    let fx = fixture(false, Duration::from_millis(500)).await;

    fx.controller.mark_comic("c3", ReadStatus::Read).await.unwrap();
    assert_eq!(progress_of(&fx.library, "c3"), (0, 1));
}

#[tokio::test]
async fn test_offline_mark_is_queued_only() {
    let fx = fixture(false, Duration::from_millis(500)).await;

    let entry = fx.controller.mark_comic("c2", ReadStatus::Read).await.unwrap();
    assert!(entry.key.is_some());
    assert!(!entry.synced);
    assert!(fx.remote.sent().is_empty());
    assert!(fx.controller.sync_pending().await.is_none());

    fx.connectivity.set_online(true);
    let report = fx.controller.sync_pending().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(fx.remote.sent().len(), 1);
    assert!(fx.store.unsynced_statuses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_online_mark_is_delivered() {
    let fx = fixture(true, Duration::from_millis(500)).await;

    fx.controller.mark_comic("c2", ReadStatus::Read).await.unwrap();

    let sent = fx.remote.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].target,
        StatusTarget::Comic {
            comic_id: "c2".into()
        }
    );
    assert!(fx.store.unsynced_statuses().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_timeout_leaves_entry_queued() {
    let fx = fixture(false, Duration::from_millis(50)).await;
    fx.controller.mark_comic("c1", ReadStatus::Read).await.unwrap();

    *fx.remote.delay.lock().unwrap() = Some(Duration::from_millis(300));
    fx.connectivity.set_online(true);

    let report = fx.controller.sync_pending().await.unwrap();
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.synced, 0);
    assert_eq!(fx.store.unsynced_statuses().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rejected_delivery_is_retried_next_pass() {
    let fx = fixture(false, Duration::from_millis(500)).await;
    fx.controller.mark_comic("c1", ReadStatus::Read).await.unwrap();
    fx.connectivity.set_online(true);

    fx.remote.fail.store(true, Ordering::SeqCst);
    let report = fx.controller.sync_pending().await.unwrap();
    assert_eq!(report.failed, 1);

    fx.remote.fail.store(false, Ordering::SeqCst);
    let report = fx.controller.sync_pending().await.unwrap();
    assert_eq!(report.synced, 1);
}

#[tokio::test]
async fn test_series_mark_touches_every_comic() {
    let fx = fixture(false, Duration::from_millis(500)).await;

    fx.controller
        .mark_series(saga_key(), ReadStatus::Read)
        .await
        .unwrap();
    assert_eq!(progress_of(&fx.library, "c1"), (23, 24));
    assert_eq!(progress_of(&fx.library, "c2"), (29, 30));
    assert_eq!(progress_of(&fx.library, "c3"), (0, 1));

    let pending = fx.store.unsynced_statuses().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].target, StatusTarget::Series(saga_key()));
}

#[tokio::test]
async fn test_status_rewrites_stored_progress() {
    let fx = fixture(false, Duration::from_millis(500)).await;
    fx.store
        .put_progress(&ProgressEntry {
            id: "c1".into(),
            last_read_page: 4,
            total_pages: Some(24),
            comic_path: Some("/library/c1.cbz".into()),
            synced: true,
            updated_at: 1,
        })
        .await
        .unwrap();

    fx.controller.mark_comic("c1", ReadStatus::Read).await.unwrap();

    let stored = fx.store.get_progress("c1").await.unwrap().unwrap();
    assert_eq!(stored.last_read_page, 23);
    assert!(!stored.synced);
}

#[tokio::test]
async fn test_mark_during_run_is_delivered_by_that_run() {
    let fx = fixture(false, Duration::from_millis(500)).await;
    fx.controller.mark_comic("c1", ReadStatus::Read).await.unwrap();

    *fx.remote.delay.lock().unwrap() = Some(Duration::from_millis(200));
    fx.connectivity.set_online(true);

    let controller = fx.controller.clone();
    let first = tokio::spawn(async move { controller.sync_pending().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.controller.mark_comic("c2", ReadStatus::Read).await.unwrap();

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(fx.remote.sent().len(), 2);
    assert!(fx.store.unsynced_statuses().await.unwrap().is_empty());
}
