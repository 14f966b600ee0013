use sqlx::{FromRow, Row};

use super::{LocalStore, StoreError};
use crate::models::{ComicEntry, ComicRecord};

#[derive(FromRow)]
struct ComicRow {
    id: String,
    comic_info: String,
    file_blob: Vec<u8>,
    downloaded_at: i64,
}

impl TryFrom<ComicRow> for ComicRecord {
    type Error = StoreError;

    fn try_from(row: ComicRow) -> Result<Self, Self::Error> {
        Ok(ComicRecord {
            id: row.id,
            comic_info: serde_json::from_str(&row.comic_info)?,
            file_blob: row.file_blob,
            downloaded_at: row.downloaded_at,
        })
    }
}

impl LocalStore {
    pub async fn put_comic(&self, record: &ComicRecord) -> Result<(), StoreError> {
        let info = serde_json::to_string(&record.comic_info)?;
        sqlx::query(
            "INSERT INTO comics (id, comic_info, file_blob, downloaded_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                comic_info = excluded.comic_info,
                file_blob = excluded.file_blob,
                downloaded_at = excluded.downloaded_at",
        )
        .bind(&record.id)
        .bind(info)
        .bind(&record.file_blob)
        .bind(record.downloaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_comic(&self, id: &str) -> Result<Option<ComicRecord>, StoreError> {
        let row = sqlx::query_as::<_, ComicRow>(
            "SELECT id, comic_info, file_blob, downloaded_at FROM comics WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ComicRecord::try_from).transpose()
    }

    /// Metadata of every download, oldest first. Blobs stay on disk.
    pub async fn downloaded_comics(&self) -> Result<Vec<ComicEntry>, StoreError> {
        let infos: Vec<String> =
            sqlx::query_scalar("SELECT comic_info FROM comics ORDER BY downloaded_at, id")
                .fetch_all(&self.pool)
                .await?;

        infos
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StoreError::from))
            .collect()
    }

    /// The metadata mirror of a downloaded comic, without loading its blob.
    pub async fn comic_info(&self, id: &str) -> Result<Option<ComicEntry>, StoreError> {
        let info: Option<String> = sqlx::query_scalar("SELECT comic_info FROM comics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match info {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn downloaded_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar("SELECT id FROM comics ORDER BY downloaded_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn delete_comic(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM comics WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_manga_mode(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let info: Option<String> = sqlx::query_scalar("SELECT comic_info FROM comics WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(json) = info else {
            return Ok(false);
        };

        let mut entry: ComicEntry = serde_json::from_str(&json)?;
        entry.manga_mode = enabled;

        sqlx::query("UPDATE comics SET comic_info = ? WHERE id = ?")
            .bind(serde_json::to_string(&entry)?)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn total_blob_size(&self) -> Result<u64, StoreError> {
        let size: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(length(file_blob)), 0) FROM comics")
            .fetch_one(&self.pool)
            .await?;
        Ok(size.max(0) as u64)
    }

    /// Deletes the oldest downloads until the stored blobs fit in `quota`
    /// bytes. Returns the evicted ids, oldest first.
    pub async fn evict_until_fits(&self, quota: u64) -> Result<Vec<String>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT id, length(file_blob) AS size FROM comics ORDER BY downloaded_at ASC, id ASC",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut sizes: Vec<(String, u64)> = rows
            .iter()
            .map(|row| {
                let size: i64 = row.get("size");
                (row.get("id"), size.max(0) as u64)
            })
            .collect();

        let mut total: u64 = sizes.iter().map(|(_, size)| size).sum();
        let mut evicted = Vec::new();

        for (id, size) in sizes.drain(..) {
            if total <= quota {
                break;
            }
            sqlx::query("DELETE FROM comics WHERE id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            total -= size;
            evicted.push(id);
        }

        tx.commit().await?;
        Ok(evicted)
    }
}
