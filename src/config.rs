use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Origin of the remote library server.
    pub server_url: String,
    /// Address the local proxy listens on.
    pub listen_addr: SocketAddr,
    pub database_url: String,
    /// Deployment scope of the application, always with a trailing slash.
    pub base_path: String,
    pub cache_version: String,
    /// Maximum bytes of downloaded comics kept locally.
    pub storage_quota: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let server_url = env::var("COMIC_SYNC_SERVER")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let listen_addr = env::var("COMIC_SYNC_LISTEN")
            .unwrap_or_else(|_| "127.0.0.1:7784".to_string())
            .parse()
            .context("COMIC_SYNC_LISTEN must be a socket address")?;

        let database_url =
            env::var("COMIC_SYNC_DB").unwrap_or_else(|_| "sqlite:secret/comic_sync.db".to_string());

        let base_path = normalize_base_path(
            &env::var("COMIC_SYNC_BASE_PATH").unwrap_or_else(|_| "/".to_string()),
        );

        let cache_version =
            env::var("COMIC_SYNC_CACHE_VERSION").unwrap_or_else(|_| "v1".to_string());

        let storage_quota = match env::var("COMIC_SYNC_STORAGE_QUOTA") {
            Ok(v) => v
                .parse()
                .context("COMIC_SYNC_STORAGE_QUOTA must be a byte count")?,
            Err(_) => 2 * 1024 * 1024 * 1024,
        };

        Ok(Self {
            server_url,
            listen_addr,
            database_url,
            base_path,
            cache_version,
            storage_quota,
        })
    }
}

pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "/");
        assert_eq!(normalize_base_path("/"), "/");
        assert_eq!(normalize_base_path("comics"), "/comics/");
        assert_eq!(normalize_base_path("/comics/reader/"), "/comics/reader/");
    }
}
