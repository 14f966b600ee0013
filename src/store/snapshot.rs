use sqlx::Row;

use super::{LocalStore, StoreError};
use crate::models::{Library, LibraryCacheSnapshot};

impl LocalStore {
    pub async fn load_snapshot(&self) -> Result<Option<LibraryCacheSnapshot>, StoreError> {
        let row = sqlx::query("SELECT data, timestamp FROM library_cache WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(LibraryCacheSnapshot {
                    data: serde_json::from_str(&data)?,
                    timestamp: row.get("timestamp"),
                }))
            }
            None => Ok(None),
        }
    }

    /// Replaces the single stored snapshot.
    pub async fn save_snapshot(&self, snapshot: &LibraryCacheSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO library_cache (id, data, timestamp) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, timestamp = excluded.timestamp",
        )
        .bind(serde_json::to_string(&snapshot.data)?)
        .bind(snapshot.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrites the stored tree while keeping its capture time, for edits such
    /// as lazily loaded series that do not make the snapshot any fresher.
    pub async fn update_snapshot_data(&self, data: &Library) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE library_cache SET data = ? WHERE id = 1")
            .bind(serde_json::to_string(data)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
