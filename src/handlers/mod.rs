pub mod library;
pub mod setting;
pub mod sync;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::boundary;
use crate::state::AppState;

/// Local client routes under `/_local`; everything else goes through the
/// network boundary.
pub fn router(state: AppState) -> Router {
    let boundary = boundary::router(state.boundary.clone());

    Router::new()
        .route("/_local/library", get(library::get_library))
        .route("/_local/library/refresh", post(library::refresh_library))
        .route("/_local/series/{root}/{publisher}/{series}", get(library::get_series))
        .route("/_local/downloads", get(library::list_downloads))
        .route(
            "/_local/downloads/{id}",
            post(library::download_comic).delete(library::remove_download),
        )
        .route("/_local/comics/{id}/manga-mode", post(library::set_manga_mode))
        .route("/_local/comics/{id}/status", post(sync::mark_comic_status))
        .route("/_local/series/status", post(sync::mark_series_status))
        .route("/_local/progress", post(sync::record_progress))
        .route("/_local/progress/{id}/remote", get(sync::check_remote_progress))
        .route("/_local/progress/{id}/ahead", get(sync::remote_ahead))
        .route("/_local/progress/{id}/watch", post(sync::watch_remote_progress))
        .route("/_local/progress/watch", delete(sync::unwatch_remote_progress))
        .route("/_local/sync", post(sync::sync_now))
        .route("/_local/connectivity", post(sync::set_connectivity))
        .route("/_local/setting", get(setting::list_settings))
        .route("/_local/setting/{key}", post(setting::update_setting))
        .with_state(state)
        .fallback_service(boundary)
}
