use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::store::StoreError;

pub async fn init_db(db_url: &str) -> Result<SqlitePool, StoreError> {
    let db_path = db_url.trim_start_matches("sqlite:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(
            SqliteConnectOptions::from_str(db_url)?
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// A private in-memory database. A single connection that never expires,
/// since every new SQLite memory connection starts from an empty database.
pub async fn init_memory_db() -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
