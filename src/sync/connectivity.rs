use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::sync::progress::ProgressSyncController;
use crate::sync::status::StatusSyncController;

/// Online/offline state with change notifications.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns true when the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Any HTTP answer from the server counts as online; only transport
/// failures count as offline.
pub async fn probe(client: &Client, server_url: &str, timeout: Duration) -> bool {
    client
        .head(server_url)
        .timeout(timeout)
        .send()
        .await
        .is_ok()
}

/// Flushes both controllers every time connectivity comes back.
pub fn spawn_reconnect_flush(
    connectivity: &Connectivity,
    progress: Arc<ProgressSyncController>,
    status: Arc<StatusSyncController>,
) -> JoinHandle<()> {
    let mut rx = connectivity.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let online = *rx.borrow_and_update();
            if !online {
                continue;
            }
            tracing::info!("Back online, flushing queued progress and status changes");
            if let Some(report) = progress.sync_now().await {
                tracing::debug!("Reconnect progress flush: {:?}", report);
            }
            if let Some(report) = status.sync_pending().await {
                tracing::debug!("Reconnect status flush: {:?}", report);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_online_reports_changes_only() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        assert!(!connectivity.set_online(true));
        assert!(connectivity.set_online(false));
        assert!(!connectivity.is_online());

        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
