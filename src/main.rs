use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use comic_sync::boundary::{BoundaryConfig, HttpUpstream, NetworkBoundary};
use comic_sync::cache::CacheStorage;
use comic_sync::config::AppConfig;
use comic_sync::library::{DownloadManager, HttpLibraryApi, LibraryCacheMerger, LibraryHandle};
use comic_sync::settings::{self, Tunables};
use comic_sync::state::AppState;
use comic_sync::store::StoreContext;
use comic_sync::sync::connectivity::{probe, spawn_reconnect_flush};
use comic_sync::sync::http_client::create_client;
use comic_sync::sync::{
    Connectivity, HttpDeviceSync, HttpStatusRemote, ProgressSyncController, StatusSyncController,
};
use comic_sync::{handlers, sync};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let stores = StoreContext::new(&config.database_url);
    let store = stores.open().await?.clone();
    let tunables = Tunables::load(store.pool()).await?;
    let device_id = settings::device_id(store.pool()).await?;

    let client = create_client(Duration::from_secs(30))?;
    let connectivity = Connectivity::new(probe(&client, &config.server_url, Duration::from_secs(5)).await);
    let library = LibraryHandle::default();

    let device = Arc::new(HttpDeviceSync::new(client.clone(), &config.server_url, device_id)?);
    let api = Arc::new(HttpLibraryApi::new(client.clone(), &config.server_url)?);
    let remote = Arc::new(HttpStatusRemote::new(client.clone(), &config.server_url)?);

    let progress = ProgressSyncController::new(
        store.clone(),
        library.clone(),
        device.clone(),
        connectivity.clone(),
        tunables.progress_debounce,
    );
    let _remote_listener = progress.listen_remote();
    let status = StatusSyncController::new(
        store.clone(),
        library.clone(),
        remote,
        connectivity.clone(),
        tunables.status_timeout,
    );
    let merger = Arc::new(LibraryCacheMerger::new(
        store.clone(),
        library.clone(),
        api.clone(),
        device,
        &tunables,
    ));
    let downloads = Arc::new(DownloadManager::new(
        store.clone(),
        library.clone(),
        api,
        config.storage_quota,
    ));

    let boundary = Arc::new(NetworkBoundary::new(
        BoundaryConfig::new(&config.cache_version, &config.base_path),
        Arc::new(CacheStorage::load(store.clone()).await?),
        Arc::new(HttpUpstream::new(client.clone(), &config.server_url)),
    ));
    boundary.install().await;
    boundary.activate().await;

    // Serve whatever was cached last time before touching the network.
    match merger.load_cached().await {
        Ok(Some(_)) => {}
        Ok(None) => tracing::info!("No cached library yet"),
        Err(e) => tracing::warn!("Could not load cached library: {}", e),
    }

    let state = AppState {
        store,
        library,
        connectivity: connectivity.clone(),
        progress: progress.clone(),
        status: status.clone(),
        merger: merger.clone(),
        downloads,
        boundary,
    };

    let _flush = spawn_reconnect_flush(&connectivity, progress.clone(), status.clone());

    tokio::spawn(async move {
        merger.reconcile().await;
        progress.sync_now().await;
        status.sync_pending().await;
    });

    let _scheduler =
        sync::scheduler::start_scheduler(state.clone(), client, config.server_url.clone()).await?;

    let app = handlers::router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
            .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
