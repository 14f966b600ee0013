use super::{LocalStore, StoreError};
use crate::models::{ComicEntry, ProgressEntry};

const PROGRESS_COLUMNS: &str = "id, last_read_page, total_pages, comic_path, synced, updated_at";

impl LocalStore {
    pub async fn put_progress(&self, entry: &ProgressEntry) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_progress(&mut conn, entry).await
    }

    /// Writes a progress row and, when the comic is downloaded, the progress
    /// embedded in its metadata mirror. Both land in one transaction.
    pub async fn record_progress(&self, entry: &ProgressEntry) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        upsert_progress(&mut *tx, entry).await?;

        let info: Option<String> = sqlx::query_scalar("SELECT comic_info FROM comics WHERE id = ?")
            .bind(&entry.id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(json) = info {
            let mut comic: ComicEntry = serde_json::from_str(&json)?;
            comic.progress.last_read_page = entry.last_read_page;
            if let Some(total) = entry.total_pages {
                comic.progress.total_pages = total;
            }
            sqlx::query("UPDATE comics SET comic_info = ? WHERE id = ?")
                .bind(serde_json::to_string(&comic)?)
                .bind(&entry.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_progress(&self, id: &str) -> Result<Option<ProgressEntry>, StoreError> {
        let entry = sqlx::query_as::<_, ProgressEntry>(&format!(
            "SELECT {} FROM progress WHERE id = ?",
            PROGRESS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    pub async fn get_all_progress(&self) -> Result<Vec<ProgressEntry>, StoreError> {
        let entries = sqlx::query_as::<_, ProgressEntry>(&format!(
            "SELECT {} FROM progress ORDER BY updated_at",
            PROGRESS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn unsynced_progress(&self) -> Result<Vec<ProgressEntry>, StoreError> {
        let entries = sqlx::query_as::<_, ProgressEntry>(&format!(
            "SELECT {} FROM progress WHERE synced = 0 ORDER BY updated_at",
            PROGRESS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Marks an entry synced only if it still holds the delivered pair. A
    /// newer page written while the delivery was in flight stays unsynced.
    pub async fn mark_progress_synced(
        &self,
        id: &str,
        last_read_page: i64,
        total_pages: Option<i64>,
        comic_path: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE progress
             SET synced = 1, comic_path = COALESCE(comic_path, ?)
             WHERE id = ? AND last_read_page = ? AND total_pages IS ?",
        )
        .bind(comic_path)
        .bind(id)
        .bind(last_read_page)
        .bind(total_pages)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_progress(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM progress WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn upsert_progress(
    conn: &mut sqlx::SqliteConnection,
    entry: &ProgressEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO progress (id, last_read_page, total_pages, comic_path, synced, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            last_read_page = excluded.last_read_page,
            total_pages = COALESCE(excluded.total_pages, progress.total_pages),
            comic_path = COALESCE(excluded.comic_path, progress.comic_path),
            synced = excluded.synced,
            updated_at = excluded.updated_at",
    )
    .bind(&entry.id)
    .bind(entry.last_read_page)
    .bind(entry.total_pages)
    .bind(&entry.comic_path)
    .bind(entry.synced)
    .bind(entry.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}
