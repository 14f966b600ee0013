use axum::body::Bytes;
use sqlx::Row;

use super::{LocalStore, StoreError};
use crate::cache::CachedResponse;

/// A cached response together with the generation and key it was stored under.
pub struct CacheRow {
    pub generation: String,
    pub key: String,
    pub response: CachedResponse,
}

impl LocalStore {
    pub async fn cache_entries(&self) -> Result<Vec<CacheRow>, StoreError> {
        let rows = sqlx::query("SELECT generation, key, status, headers, body FROM cache_entries")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let status: i64 = row.get("status");
                let headers: String = row.get("headers");
                let body: Vec<u8> = row.get("body");
                Ok(CacheRow {
                    generation: row.get("generation"),
                    key: row.get("key"),
                    response: CachedResponse {
                        status: u16::try_from(status)
                            .map_err(|_| StoreError::Corrupt(format!("cache status {}", status)))?,
                        headers: serde_json::from_str(&headers)?,
                        body: Bytes::from(body),
                    },
                })
            })
            .collect()
    }

    pub async fn put_cache_entry(
        &self,
        generation: &str,
        key: &str,
        response: &CachedResponse,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cache_entries (generation, key, status, headers, body) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(generation, key) DO UPDATE SET
                status = excluded.status, headers = excluded.headers, body = excluded.body",
        )
        .bind(generation)
        .bind(key)
        .bind(i64::from(response.status))
        .bind(serde_json::to_string(&response.headers)?)
        .bind(response.body.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the number of entries removed.
    pub async fn delete_cache_generation(&self, generation: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE generation = ?")
            .bind(generation)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
