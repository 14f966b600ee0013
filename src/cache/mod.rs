use axum::body::Bytes;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::store::{LocalStore, StoreError};

/// Upper bound on responses held by a single generation.
const GENERATION_CAPACITY: u64 = 10_000;

/// A response as stored in a cache generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// `{prefix}-{version}-{base_path}`
pub fn generation_name(prefix: &str, version: &str, base_path: &str) -> String {
    format!("{}-{}-{}", prefix, version, base_path)
}

fn strip_query(key: &str) -> &str {
    key.split_once('?').map_or(key, |(path, _)| path)
}

/// One named, versioned bucket of cached responses, keyed by path and query.
/// Held in memory; with a backing store every write also lands in the
/// `cache_entries` table.
pub struct CacheGeneration {
    name: String,
    entries: Cache<String, CachedResponse>,
    store: Option<LocalStore>,
}

impl CacheGeneration {
    fn new(name: &str, store: Option<LocalStore>) -> Self {
        let entries = Cache::builder().max_capacity(GENERATION_CAPACITY).build();
        Self {
            name: name.to_string(),
            entries,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        self.entries.get(key).await
    }

    pub async fn put(&self, key: &str, response: CachedResponse) {
        if let Some(store) = &self.store {
            if let Err(e) = store.put_cache_entry(&self.name, key, &response).await {
                tracing::warn!("Could not persist {} in cache {}: {}", key, self.name, e);
            }
        }
        self.entries.insert(key.to_string(), response).await;
    }

    /// Lookup that ignores the query string on both sides, so a
    /// cache-busting `?v=` does not hide an otherwise identical asset.
    pub async fn match_ignoring_query(&self, key: &str) -> Option<CachedResponse> {
        if let Some(hit) = self.get(key).await {
            return Some(hit);
        }
        let wanted = strip_query(key);
        self.entries
            .iter()
            .find(|(stored, _)| strip_query(stored) == wanted)
            .map(|(_, response)| response)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| (*k).clone()).collect()
    }
}

/// All cache generations, either for this process only or restored from and
/// written through to the local store.
#[derive(Default)]
pub struct CacheStorage {
    generations: RwLock<HashMap<String, Arc<CacheGeneration>>>,
    store: Option<LocalStore>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores every generation a previous run left in the store.
    pub async fn load(store: LocalStore) -> Result<Self, StoreError> {
        let rows = store.cache_entries().await?;
        let storage = Self {
            generations: RwLock::new(HashMap::new()),
            store: Some(store),
        };

        let count = rows.len();
        for row in rows {
            storage
                .open(&row.generation)
                .entries
                .insert(row.key, row.response)
                .await;
        }

        tracing::info!(
            "Restored {} cached responses in {} generations",
            count,
            storage.read().len()
        );
        Ok(storage)
    }

    /// Returns the named generation, creating it on first use.
    pub fn open(&self, name: &str) -> Arc<CacheGeneration> {
        if let Some(existing) = self.read().get(name) {
            return Arc::clone(existing);
        }
        let mut generations = self.generations.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            generations
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CacheGeneration::new(name, self.store.clone()))),
        )
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub async fn delete(&self, name: &str) -> bool {
        let removed = self
            .generations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some();

        if let Some(store) = &self.store {
            if let Err(e) = store.delete_cache_generation(name).await {
                tracing::warn!("Could not delete stored cache {}: {}", name, e);
            }
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<CacheGeneration>>> {
        self.generations.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            headers: vec![("content-type".into(), "text/css".into())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_open_returns_same_generation() {
        let storage = CacheStorage::new();
        let first = storage.open("comics-v1-/");
        first.put("/app.css", response("a")).await;

        let second = storage.open("comics-v1-/");
        assert_eq!(second.get("/app.css").await, Some(response("a")));
        assert_eq!(storage.keys(), vec!["comics-v1-/".to_string()]);
    }

    #[tokio::test]
    async fn test_match_ignoring_query() {
        let storage = CacheStorage::new();
        let generation = storage.open("comics-v1-/");
        generation.put("/styles/app.css?v=12", response("styles")).await;

        assert!(generation.get("/styles/app.css?v=13").await.is_none());
        assert_eq!(
            generation.match_ignoring_query("/styles/app.css?v=13").await,
            Some(response("styles"))
        );
        assert!(generation.match_ignoring_query("/styles/other.css").await.is_none());
    }

    #[tokio::test]
    async fn test_generations_survive_reload() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let storage = CacheStorage::load(store.clone()).await.unwrap();
        storage.open("comics-v1-/").put("/app.css", response("a")).await;
        storage.open("comics-v0-/").put("/old.css", response("b")).await;
        assert!(storage.delete("comics-v0-/").await);

        let reloaded = CacheStorage::load(store).await.unwrap();
        assert_eq!(reloaded.keys(), vec!["comics-v1-/".to_string()]);
        assert_eq!(
            reloaded.open("comics-v1-/").get("/app.css").await,
            Some(response("a"))
        );
    }

    #[test]
    fn test_generation_name() {
        assert_eq!(generation_name("comic-library", "v3", "/reader/"), "comic-library-v3-/reader/");
    }
}
