use anyhow::Result;
use rand::distr::Alphanumeric;
use rand::Rng;
use sqlx::{Row, SqlitePool};
use std::time::Duration;

pub const PROGRESS_DEBOUNCE_MS: &str = "progress_debounce_ms";
pub const STATUS_TIMEOUT_MS: &str = "status_timeout_ms";
pub const LIBRARY_STALE_AFTER_SECS: &str = "library_stale_after_secs";
pub const CHUNK_THRESHOLD: &str = "chunk_threshold";
pub const DEVICE_ID: &str = "device_id";

const NUMERIC_KEYS: [&str; 4] = [
    PROGRESS_DEBOUNCE_MS,
    STATUS_TIMEOUT_MS,
    LIBRARY_STALE_AFTER_SECS,
    CHUNK_THRESHOLD,
];

/// Checks a value written through the settings route. The device id is
/// generated once and cannot be replaced; tunables must be positive integers.
pub fn validate_setting(key: &str, value: &str) -> Result<(), String> {
    if key == DEVICE_ID {
        return Err(format!("{} is read-only", key));
    }
    if NUMERIC_KEYS.contains(&key) && !matches!(value.parse::<u64>(), Ok(n) if n > 0) {
        return Err(format!("{} must be a positive integer", key));
    }
    Ok(())
}

/// Get a setting value as u64, returning the default if not found or invalid
pub async fn get_setting_u64(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    let result = sqlx::query("SELECT value FROM setting WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match result {
        Some(row) => {
            let value: String = row.get("value");
            Ok(value.parse().unwrap_or(default))
        }
        None => Ok(default),
    }
}

/// Get a setting value as String, returning the default if not found
pub async fn get_setting_string(pool: &SqlitePool, key: &str, default: &str) -> Result<String> {
    let result = sqlx::query("SELECT value FROM setting WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match result {
        Some(row) => {
            let value: String = row.get("value");
            Ok(value)
        }
        None => Ok(default.to_string()),
    }
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO setting (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// The identifier this installation reports progress under. Generated once
/// and kept in the setting table.
pub async fn device_id(pool: &SqlitePool) -> Result<String> {
    let existing = get_setting_string(pool, DEVICE_ID, "").await?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    let id = format!("device-{}", suffix.to_lowercase());

    set_setting(pool, DEVICE_ID, &id).await?;
    tracing::info!("Registered new device id {}", id);
    Ok(id)
}

/// Runtime tunables of the sync engine.
#[derive(Debug, Clone)]
pub struct Tunables {
    pub progress_debounce: Duration,
    pub status_timeout: Duration,
    pub library_stale_after: Duration,
    pub chunk_threshold: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            progress_debounce: Duration::from_millis(400),
            status_timeout: Duration::from_millis(3000),
            library_stale_after: Duration::from_secs(5 * 60),
            chunk_threshold: 1000,
        }
    }
}

impl Tunables {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let defaults = Self::default();

        let debounce_ms = get_setting_u64(
            pool,
            PROGRESS_DEBOUNCE_MS,
            defaults.progress_debounce.as_millis() as u64,
        )
        .await?;
        let timeout_ms = get_setting_u64(
            pool,
            STATUS_TIMEOUT_MS,
            defaults.status_timeout.as_millis() as u64,
        )
        .await?;
        let stale_secs = get_setting_u64(
            pool,
            LIBRARY_STALE_AFTER_SECS,
            defaults.library_stale_after.as_secs(),
        )
        .await?;
        let chunk_threshold =
            get_setting_u64(pool, CHUNK_THRESHOLD, defaults.chunk_threshold as u64).await?;

        Ok(Self {
            progress_debounce: Duration::from_millis(debounce_ms),
            status_timeout: Duration::from_millis(timeout_ms),
            library_stale_after: Duration::from_secs(stale_secs),
            chunk_threshold: chunk_threshold as usize,
        })
    }
}
