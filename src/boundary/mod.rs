//! Network boundary: answers every in-scope GET from the network or from a
//! versioned cache generation, depending on the request class.

pub mod classify;
pub mod upstream;

pub use classify::{classify, RequestClass};
pub use upstream::{BoundaryError, HttpUpstream, ProxyRequest, Upstream};

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Router,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{generation_name, CacheGeneration, CacheStorage, CachedResponse};
use crate::utils::response::{bad_gateway, offline_api, service_unavailable};

const CACHE_PREFIX: &str = "comic-library";

/// Largest request body the proxy buffers before forwarding.
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Application shell files pre-cached on install, relative to the base path.
const SHELL_ASSETS: &[&str] = &[
    "",
    "index.html",
    "manifest.json",
    "css/style.css",
    "js/app.js",
    "js/library.js",
    "js/viewer.js",
    "js/offline.js",
    "icons/icon-192.png",
    "icons/icon-512.png",
];

#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    pub prefix: String,
    pub version: String,
    /// Deployment scope, with leading and trailing slash.
    pub base_path: String,
    pub precache: Vec<String>,
}

impl BoundaryConfig {
    pub fn new(version: &str, base_path: &str) -> Self {
        Self {
            prefix: CACHE_PREFIX.to_string(),
            version: version.to_string(),
            base_path: base_path.to_string(),
            precache: SHELL_ASSETS
                .iter()
                .map(|asset| format!("{}{}", base_path, asset))
                .collect(),
        }
    }

    pub fn cache_name(&self) -> String {
        generation_name(&self.prefix, &self.version, &self.base_path)
    }

    pub fn app_shell(&self) -> String {
        format!("{}index.html", self.base_path)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: Vec<String>,
}

pub struct NetworkBoundary {
    config: BoundaryConfig,
    caches: Arc<CacheStorage>,
    upstream: Arc<dyn Upstream>,
    controlling: AtomicBool,
}

impl NetworkBoundary {
    pub fn new(config: BoundaryConfig, caches: Arc<CacheStorage>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config,
            caches,
            upstream,
            controlling: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::SeqCst)
    }

    fn current(&self) -> Arc<CacheGeneration> {
        self.caches.open(&self.config.cache_name())
    }

    /// Pre-caches the application shell. Failing assets are reported and
    /// skipped; installation itself never fails.
    pub async fn install(&self) -> InstallReport {
        let cache = self.current();
        let mut report = InstallReport::default();

        for path in &self.config.precache {
            match self.upstream.fetch(&ProxyRequest::get(path)).await {
                Ok(response) if response.is_success() => {
                    cache.put(path, response).await;
                    report.cached += 1;
                }
                Ok(response) => {
                    tracing::warn!("Pre-cache of {} answered {}", path, response.status);
                    report.failed.push(path.clone());
                }
                Err(e) => {
                    tracing::warn!("Pre-cache of {} failed: {}", path, e);
                    report.failed.push(path.clone());
                }
            }
        }

        tracing::info!(
            "Installed cache {}: {} assets cached, {} failed",
            cache.name(),
            report.cached,
            report.failed.len()
        );
        report
    }

    /// Deletes every generation of this application other than the current
    /// one, then takes control of requests. Returns the deleted names.
    pub async fn activate(&self) -> Vec<String> {
        let current = self.config.cache_name();
        let own_prefix = format!("{}-", self.config.prefix);

        let mut deleted = Vec::new();
        for name in self.caches.keys() {
            if name.starts_with(&own_prefix) && name != current && self.caches.delete(&name).await {
                tracing::info!("Deleted stale cache generation {}", name);
                deleted.push(name);
            }
        }

        self.current();
        self.controlling.store(true, Ordering::SeqCst);
        tracing::info!("Cache {} active, claimed clients", current);
        deleted
    }

    /// Answers one request. Never fails: when neither the network nor the
    /// cache can help, the answer is a synthetic error response.
    pub async fn handle(&self, request: ProxyRequest) -> CachedResponse {
        let class = classify(
            &request.method,
            &request.path_and_query,
            request.accept(),
            &self.config.base_path,
        );
        tracing::debug!("{} {} -> {:?}", request.method, request.path_and_query, class);

        match class {
            RequestClass::Bypass => self
                .upstream
                .fetch(&request)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Pass-through {} failed: {}", request.path_and_query, e);
                    bad_gateway()
                }),
            RequestClass::Api => self.api(&request).await,
            RequestClass::Navigation => self.navigation(&request).await,
            RequestClass::Script => self.script(&request).await,
            RequestClass::Static => self.static_asset(&request).await,
        }
    }

    async fn api(&self, request: &ProxyRequest) -> CachedResponse {
        match self.upstream.fetch(&request.no_store()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("API {} offline: {}", request.path_and_query, e);
                match self.current().get(&request.path_and_query).await {
                    Some(cached) => cached,
                    None => offline_api(),
                }
            }
        }
    }

    async fn navigation(&self, request: &ProxyRequest) -> CachedResponse {
        match self.upstream.fetch(&request.no_store()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Navigation to {} offline: {}", request.path_and_query, e);
                let cache = self.current();
                if let Some(cached) = cache.get(&request.path_and_query).await {
                    return cached;
                }
                match cache.get(&self.config.app_shell()).await {
                    Some(shell) => shell,
                    None => service_unavailable("Offline"),
                }
            }
        }
    }

    async fn script(&self, request: &ProxyRequest) -> CachedResponse {
        match self.upstream.fetch(&request.no_store()).await {
            Ok(response) => {
                if response.is_success() {
                    self.current().put(&request.path_and_query, response.clone()).await;
                }
                response
            }
            Err(e) => {
                tracing::debug!("Script {} offline: {}", request.path_and_query, e);
                match self.current().match_ignoring_query(&request.path_and_query).await {
                    Some(cached) => cached,
                    None => service_unavailable("Script unavailable offline"),
                }
            }
        }
    }

    async fn static_asset(&self, request: &ProxyRequest) -> CachedResponse {
        let cache = self.current();
        if let Some(cached) = cache.get(&request.path_and_query).await {
            return cached;
        }

        match self.upstream.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    cache.put(&request.path_and_query, response.clone()).await;
                }
                response
            }
            Err(e) => {
                tracing::debug!("Asset {} offline: {}", request.path_and_query, e);
                match cache.match_ignoring_query(&request.path_and_query).await {
                    Some(cached) => cached,
                    None => service_unavailable("Asset unavailable offline"),
                }
            }
        }
    }
}

/// A router that sends every request through the boundary. Mounted as the
/// fallback of the local routes.
pub fn router(boundary: Arc<NetworkBoundary>) -> Router {
    Router::new().fallback(intercept).with_state(boundary)
}

async fn intercept(State(boundary): State<Arc<NetworkBoundary>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Could not read request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let request = ProxyRequest {
        method: parts.method,
        path_and_query,
        headers: parts.headers,
        body,
    };

    boundary.handle(request).await.into_response()
}
