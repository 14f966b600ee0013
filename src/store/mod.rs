//! Local persistent store: downloaded comics, reading progress, read/unread
//! events, the cached library snapshot and the offline response cache, each
//! in its own table.

mod cache;
mod comics;
mod error;
mod progress;
mod snapshot;
mod statuses;

pub use cache::CacheRow;
pub use error::StoreError;

use sqlx::SqlitePool;
use tokio::sync::OnceCell;

use crate::db;

#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub async fn open(db_url: &str) -> Result<Self, StoreError> {
        let pool = db::init_db(db_url).await?;
        tracing::info!("Local store opened at {}", db_url);
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = db::init_memory_db().await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Owns the process-wide store handle. The pool is created on the first
/// `open` and every later caller, concurrent or not, gets the same handle.
pub struct StoreContext {
    db_url: String,
    store: OnceCell<LocalStore>,
}

impl StoreContext {
    pub fn new(db_url: &str) -> Self {
        Self {
            db_url: db_url.to_string(),
            store: OnceCell::new(),
        }
    }

    pub async fn open(&self) -> Result<&LocalStore, StoreError> {
        self.store
            .get_or_try_init(|| LocalStore::open(&self.db_url))
            .await
    }
}
