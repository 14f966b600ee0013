use sqlx::FromRow;

use super::{LocalStore, StoreError};
use crate::models::{SeriesKey, StatusEntry, StatusTarget};

#[derive(FromRow)]
struct StatusRow {
    key: i64,
    #[sqlx(rename = "type")]
    kind: String,
    comic_id: Option<String>,
    root_folder: Option<String>,
    publisher: Option<String>,
    series_name: Option<String>,
    status: String,
    synced: bool,
    timestamp: i64,
}

impl TryFrom<StatusRow> for StatusEntry {
    type Error = StoreError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let target = match (row.kind.as_str(), row.comic_id) {
            ("comic", Some(comic_id)) => StatusTarget::Comic { comic_id },
            ("series", _) => match (row.root_folder, row.publisher, row.series_name) {
                (Some(root_folder), Some(publisher), Some(series_name)) => {
                    StatusTarget::Series(SeriesKey {
                        root_folder,
                        publisher,
                        series_name,
                    })
                }
                _ => {
                    return Err(StoreError::Corrupt(format!(
                        "series status {} is missing its series key",
                        row.key
                    )))
                }
            },
            (kind, _) => {
                return Err(StoreError::Corrupt(format!(
                    "status {} has invalid target type '{}'",
                    row.key, kind
                )))
            }
        };

        Ok(StatusEntry {
            key: Some(row.key),
            target,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            synced: row.synced,
            timestamp: row.timestamp,
        })
    }
}

const STATUS_COLUMNS: &str =
    "key, type, comic_id, root_folder, publisher, series_name, status, synced, timestamp";

impl LocalStore {
    /// Inserts a new status event, or overwrites the row named by `entry.key`.
    /// Returns the row key.
    pub async fn put_status(&self, entry: &StatusEntry) -> Result<i64, StoreError> {
        let (comic_id, series) = match &entry.target {
            StatusTarget::Comic { comic_id } => (Some(comic_id.as_str()), None),
            StatusTarget::Series(key) => (None, Some(key)),
        };

        let key = sqlx::query_scalar::<_, i64>(
            "INSERT INTO statuses
                (key, type, comic_id, root_folder, publisher, series_name, status, synced, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                type = excluded.type,
                comic_id = excluded.comic_id,
                root_folder = excluded.root_folder,
                publisher = excluded.publisher,
                series_name = excluded.series_name,
                status = excluded.status,
                synced = excluded.synced,
                timestamp = excluded.timestamp
             RETURNING key",
        )
        .bind(entry.key)
        .bind(entry.target.kind())
        .bind(comic_id)
        .bind(series.map(|s| s.root_folder.as_str()))
        .bind(series.map(|s| s.publisher.as_str()))
        .bind(series.map(|s| s.series_name.as_str()))
        .bind(entry.status.as_str())
        .bind(entry.synced)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    pub async fn get_all_statuses(&self) -> Result<Vec<StatusEntry>, StoreError> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            "SELECT {} FROM statuses ORDER BY timestamp, key",
            STATUS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusEntry::try_from).collect()
    }

    pub async fn unsynced_statuses(&self) -> Result<Vec<StatusEntry>, StoreError> {
        let rows = sqlx::query_as::<_, StatusRow>(&format!(
            "SELECT {} FROM statuses WHERE synced = 0 ORDER BY timestamp, key",
            STATUS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusEntry::try_from).collect()
    }

    pub async fn mark_status_synced(&self, key: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE statuses SET synced = 1 WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drops acknowledged events recorded before `before_ms`.
    pub async fn prune_synced_statuses(&self, before_ms: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM statuses WHERE synced = 1 AND timestamp < ?")
            .bind(before_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
