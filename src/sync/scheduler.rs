use reqwest::Client;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::state::AppState;
use crate::sync::connectivity::probe;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodic re-trigger of both sync controllers and of library
/// reconciliation. This is what bounds how long a failed delivery waits.
pub async fn start_scheduler(state: AppState, client: Client, server_url: String) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let state = state.clone();
        let client = client.clone();
        let server_url = server_url.clone();
        Box::pin(async move {
            let online = probe(&client, &server_url, PROBE_TIMEOUT).await;
            // A change to online also fires the reconnect flush.
            state.connectivity.set_online(online);
            if !online {
                tracing::debug!("Server unreachable, skipping periodic sync");
                return;
            }

            let status = state.status.sync_pending().await;
            let progress = state.progress.sync_now().await;
            let reconcile = state.merger.reconcile().await;

            if let Some(report) = &progress {
                if report.synced + report.failed + report.removed > 0 {
                    tracing::info!(
                        "Periodic progress sync: {} synced, {} failed, {} removed",
                        report.synced,
                        report.failed,
                        report.removed
                    );
                }
            }
            if let Some(report) = &status {
                if report.failed + report.timed_out > 0 {
                    tracing::warn!(
                        "Periodic status sync left {} status change(s) queued",
                        report.failed + report.timed_out
                    );
                }
            }
            if let Some(refresh) = &reconcile.refreshed {
                tracing::info!("Periodic reconcile refreshed {} comics", refresh.comic_count);
            }

            let now = crate::utils::time::now_millis();
            match state.store.prune_synced_statuses(now - 24 * 60 * 60 * 1000).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Pruned {} acknowledged status event(s)", n),
                Err(e) => tracing::warn!("Could not prune status events: {}", e),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!("Sync scheduler started - running every minute");

    Ok(scheduler)
}
